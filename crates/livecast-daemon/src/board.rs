//! The canonical status board.
//!
//! Readers get an `Arc<BoardSnapshot>` that never changes under them; every
//! write builds a new snapshot and swaps it in.  Poll cycles carry a ticket
//! and their results are dropped unless the ticket is newer than whatever was
//! last applied and was issued under the current scope epoch.
//!
//! Sessions returned by a start or stop are noted on the board straight
//! away and stay patched over the views until a cycle that began after the
//! note is applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use livecast_proto::model::{PollScope, SessionId, SessionRecord, StreamId};
use livecast_proto::normalize::{normalize, CanonicalStatus, StreamView};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum BoardHealth {
    /// Nothing applied for the current scope yet.
    Loading,
    Fresh,
    /// The last cycle failed; views are from an earlier cycle.
    CouldNotRefresh(String),
}

#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    /// Sequence number of the last cycle applied (success or failure).
    pub cycle: u64,
    pub epoch: u64,
    pub scope: PollScope,
    pub views: Vec<StreamView>,
    /// Streams across all pages, as reported by the backend.
    pub total: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub health: BoardHealth,
    /// Sessions we changed ourselves that no applied cycle has seen yet.
    pub pending: HashMap<StreamId, PendingSession>,
}

#[derive(Debug, Clone)]
pub struct PendingSession {
    pub record: SessionRecord,
    /// Highest cycle sequence issued when the note was taken.
    noted_at: u64,
}

impl BoardSnapshot {
    fn empty(scope: PollScope) -> Self {
        Self {
            cycle: 0,
            epoch: 0,
            scope,
            views: Vec::new(),
            total: 0,
            refreshed_at: None,
            health: BoardHealth::Loading,
            pending: HashMap::new(),
        }
    }

    fn patch(&mut self, record: &SessionRecord) {
        if let Some(view) = self.views.iter_mut().find(|v| v.id() == record.stream_id) {
            *view = normalize(&view.stream, Some(record), view.telemetry.as_ref());
        }
    }

    pub fn view(&self, id: StreamId) -> Option<&StreamView> {
        self.views.iter().find(|v| v.id() == id)
    }
}

/// Issued when a cycle starts; presented again when it finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleTicket {
    pub seq: u64,
    pub epoch: u64,
    pub scope: PollScope,
}

pub struct StatusBoard {
    current: RwLock<Arc<BoardSnapshot>>,
    next_seq: AtomicU64,
}

impl StatusBoard {
    pub fn new(scope: PollScope) -> Self {
        Self {
            current: RwLock::new(Arc::new(BoardSnapshot::empty(scope))),
            next_seq: AtomicU64::new(0),
        }
    }

    pub async fn snapshot(&self) -> Arc<BoardSnapshot> {
        Arc::clone(&*self.current.read().await)
    }

    pub async fn begin_cycle(&self) -> CycleTicket {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let snap = self.current.read().await;
        CycleTicket {
            seq,
            epoch: snap.epoch,
            scope: snap.scope.clone(),
        }
    }

    /// Install a cycle's views.  Returns false when the ticket is stale.
    pub async fn apply(&self, ticket: &CycleTicket, views: Vec<StreamView>, total: usize) -> bool {
        let mut current = self.current.write().await;
        if !accepts(&current, ticket) {
            return false;
        }
        let pending: HashMap<StreamId, PendingSession> = current
            .pending
            .iter()
            .filter(|(_, p)| p.noted_at >= ticket.seq)
            .map(|(id, p)| (*id, p.clone()))
            .collect();
        let mut next = BoardSnapshot {
            cycle: ticket.seq,
            epoch: current.epoch,
            scope: current.scope.clone(),
            views,
            total,
            refreshed_at: Some(Utc::now()),
            health: BoardHealth::Fresh,
            pending,
        };
        for p in next.pending.values().cloned().collect::<Vec<_>>() {
            next.patch(&p.record);
        }
        *current = Arc::new(next);
        true
    }

    /// Record a session the backend just returned for a start or stop.
    pub async fn note_session(&self, record: SessionRecord) {
        let mut current = self.current.write().await;
        let mut next = BoardSnapshot::clone(&current);
        next.patch(&record);
        next.pending.insert(
            record.stream_id,
            PendingSession {
                noted_at: self.next_seq.load(Ordering::SeqCst),
                record,
            },
        );
        *current = Arc::new(next);
    }

    /// Flag the board as not refreshed, keeping the views it has.
    pub async fn mark_failed(&self, ticket: &CycleTicket, message: String) -> bool {
        let mut current = self.current.write().await;
        if !accepts(&current, ticket) {
            return false;
        }
        let mut next = BoardSnapshot::clone(&current);
        next.cycle = ticket.seq;
        next.health = BoardHealth::CouldNotRefresh(message);
        *current = Arc::new(next);
        true
    }

    /// Switch to another page or owner.  Bumps the epoch so cycles started
    /// for the old scope are never applied, and clears the views.
    pub async fn set_scope(&self, scope: PollScope) -> u64 {
        let mut current = self.current.write().await;
        let epoch = current.epoch + 1;
        *current = Arc::new(BoardSnapshot {
            cycle: current.cycle,
            epoch,
            pending: current.pending.clone(),
            ..BoardSnapshot::empty(scope)
        });
        epoch
    }

    /// Status on the board, or of a pending session for a stream on
    /// another page.
    pub async fn status_of(&self, id: StreamId) -> Option<CanonicalStatus> {
        let snap = self.current.read().await;
        snap.view(id)
            .map(|v| v.status)
            .or_else(|| snap.pending.get(&id).map(|p| p.record.status.into()))
    }

    pub async fn view_for_session(&self, session_id: SessionId) -> Option<StreamView> {
        self.current
            .read()
            .await
            .views
            .iter()
            .find(|v| v.session_id == Some(session_id))
            .cloned()
    }
}

fn accepts(current: &BoardSnapshot, ticket: &CycleTicket) -> bool {
    if ticket.epoch != current.epoch {
        debug!(
            "Dropping cycle {} from scope epoch {} (now {})",
            ticket.seq, ticket.epoch, current.epoch
        );
        return false;
    }
    if ticket.seq <= current.cycle {
        debug!(
            "Dropping cycle {}: cycle {} already applied",
            ticket.seq, current.cycle
        );
        return false;
    }
    true
}
