//! Formatting helpers for whatever renders the board.

use std::cmp::Ordering;

use chrono::NaiveDateTime;

use crate::normalize::EffectiveEnd;

pub const UNBOUNDED_MARKER: &str = "∞";
pub const MISSING_MARKER: &str = "n/a";

/// `dd/mm HH:MM`
pub fn format_instant(at: Option<NaiveDateTime>) -> String {
    match at {
        Some(t) => t.format("%d/%m %H:%M").to_string(),
        None => MISSING_MARKER.to_string(),
    }
}

pub fn format_end(end: &EffectiveEnd) -> String {
    match end {
        EffectiveEnd::At(t) => format_instant(Some(*t)),
        EffectiveEnd::Unbounded => UNBOUNDED_MARKER.to_string(),
        EffectiveEnd::Unknown => MISSING_MARKER.to_string(),
    }
}

pub fn format_duration(duration: Option<i32>) -> String {
    match duration {
        Some(-1) => UNBOUNDED_MARKER.to_string(),
        Some(m) => format!("{} min", m),
        None => MISSING_MARKER.to_string(),
    }
}

/// Case-insensitive comparison that orders digit runs by value, so
/// "Demo 2" sorts before "Demo 10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut ai);
                let nb = take_digits(&mut bi);
                let ord = compare_digit_runs(&na, &nb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_lowercase().cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits<I: Iterator<Item = char>>(it: &mut std::iter::Peekable<I>) -> String {
    let mut run = String::new();
    while let Some(c) = it.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        it.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
