//! Keyed single-flight guards.
//!
//! A key stays claimed for as long as its guard lives; dropping the guard
//! (success, error or cancellation alike) releases it.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct InFlight<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self {
            keys: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Claim `key`, or `None` when it is already claimed.
    pub fn try_claim(&self, key: K) -> Option<InFlightGuard<K>> {
        if !lock(&self.keys).insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            keys: Arc::clone(&self.keys),
            key,
        })
    }
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InFlightGuard<K: Eq + Hash> {
    keys: Arc<Mutex<HashSet<K>>>,
    key: K,
}

impl<K: Eq + Hash> Drop for InFlightGuard<K> {
    fn drop(&mut self) {
        lock(&self.keys).remove(&self.key);
    }
}

// The set is only touched for an insert or remove, so a poisoned lock still
// holds a consistent set.
fn lock<K>(keys: &Mutex<HashSet<K>>) -> MutexGuard<'_, HashSet<K>> {
    keys.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_refused_until_release() {
        let flights = InFlight::new();
        let guard = flights.try_claim(7).unwrap();
        assert!(flights.try_claim(7).is_none());
        assert!(flights.try_claim(8).is_some());

        drop(guard);
        assert!(flights.try_claim(7).is_some());
    }
}
