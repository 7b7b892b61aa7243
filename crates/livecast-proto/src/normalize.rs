//! Session status normalizer.
//!
//! The only place where a stream's display status is derived.  Inputs are the
//! stream's schedule, at most one session record and at most one telemetry
//! sample; the session record is authoritative whenever it exists and
//! telemetry is decoration that never changes the outcome.

use std::collections::HashMap;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::model::{
    SessionId, SessionRecord, SessionStatus, Stream, StreamId, TelemetrySample,
    UNBOUNDED_DURATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CanonicalStatus {
    None,
    Scheduled,
    Active,
    Stopped,
}

impl CanonicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::None => "NONE",
            CanonicalStatus::Scheduled => "SCHEDULED",
            CanonicalStatus::Active => "ACTIVE",
            CanonicalStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SessionStatus> for CanonicalStatus {
    fn from(s: SessionStatus) -> Self {
        match s {
            SessionStatus::Scheduled => CanonicalStatus::Scheduled,
            SessionStatus::Active => CanonicalStatus::Active,
            SessionStatus::Stopped => CanonicalStatus::Stopped,
        }
    }
}

/// End of a broadcast as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum EffectiveEnd {
    At(NaiveDateTime),
    /// Duration `-1`: runs until stopped.
    Unbounded,
    /// Not enough information to say.
    Unknown,
}

/// One row of the canonical status board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamView {
    pub stream: Stream,
    pub session_id: Option<SessionId>,
    pub status: CanonicalStatus,
    pub effective_start: Option<NaiveDateTime>,
    pub effective_end: EffectiveEnd,
    pub telemetry: Option<TelemetrySample>,
    pub telemetry_text: Option<String>,
    /// Text the backend captured when the session stopped.
    pub specification: Option<String>,
}

impl StreamView {
    pub fn id(&self) -> StreamId {
        self.stream.id
    }

    /// Attach a sample; ignored unless the stream is ACTIVE.
    pub fn attach_telemetry(&mut self, sample: Option<TelemetrySample>) {
        if self.status != CanonicalStatus::Active {
            self.telemetry = None;
            self.telemetry_text = None;
            return;
        }
        self.telemetry_text = sample.as_ref().map(telemetry_text);
        self.telemetry = sample;
    }
}

/// Status alone, for callers that do not need the display fields.
pub fn canonical_status(stream: &Stream, record: Option<&SessionRecord>) -> CanonicalStatus {
    match record {
        Some(r) => r.status.into(),
        None if stream.scheduled_start.is_some() => CanonicalStatus::Scheduled,
        None => CanonicalStatus::None,
    }
}

pub fn normalize(
    stream: &Stream,
    record: Option<&SessionRecord>,
    telemetry: Option<&TelemetrySample>,
) -> StreamView {
    let status = canonical_status(stream, record);

    let effective_start = match status {
        CanonicalStatus::Active => record
            .and_then(|r| r.started_at)
            .or(stream.scheduled_start),
        CanonicalStatus::Scheduled => stream.scheduled_start,
        CanonicalStatus::Stopped => record.and_then(|r| r.started_at),
        CanonicalStatus::None => None,
    };

    let actual_stop = match status {
        CanonicalStatus::Stopped => record.and_then(|r| r.stopped_at),
        _ => None,
    };

    let effective_end = match actual_stop {
        Some(at) => EffectiveEnd::At(at),
        None => estimate_end(effective_start, stream.duration),
    };

    let specification = match status {
        CanonicalStatus::Stopped => record.and_then(|r| r.specification.clone()),
        _ => None,
    };

    let mut view = StreamView {
        stream: stream.clone(),
        session_id: record.map(|r| r.id),
        status,
        effective_start,
        effective_end,
        telemetry: None,
        telemetry_text: None,
        specification,
    };
    view.attach_telemetry(telemetry.cloned());
    view
}

/// Start plus duration.  `-1` is unbounded whatever the start.
pub fn estimate_end(start: Option<NaiveDateTime>, duration: Option<i32>) -> EffectiveEnd {
    match (start, duration) {
        (_, Some(UNBOUNDED_DURATION)) => EffectiveEnd::Unbounded,
        (Some(start), Some(minutes)) if minutes >= 0 => start
            .checked_add_signed(Duration::minutes(i64::from(minutes)))
            .map_or(EffectiveEnd::Unknown, EffectiveEnd::At),
        _ => EffectiveEnd::Unknown,
    }
}

/// Pick the record that speaks for a stream when the backend returns several:
/// an ACTIVE one if present, otherwise the most recent (highest id).
pub fn select_record<'a, I>(records: I) -> Option<&'a SessionRecord>
where
    I: IntoIterator<Item = &'a SessionRecord>,
{
    records.into_iter().max_by_key(|r| {
        (r.status == SessionStatus::Active, r.id)
    })
}

/// Group records by stream and keep the one `select_record` would pick.
pub fn index_records(records: &[SessionRecord]) -> HashMap<StreamId, &SessionRecord> {
    let mut grouped: HashMap<StreamId, Vec<&SessionRecord>> = HashMap::new();
    for r in records {
        grouped.entry(r.stream_id).or_default().push(r);
    }
    grouped
        .into_iter()
        .filter_map(|(id, rs)| select_record(rs).map(|r| (id, r)))
        .collect()
}

/// `fps=29.9 bitrate=2500kbits/s speed=1.01x`, with `-` for missing parts.
pub fn telemetry_text(sample: &TelemetrySample) -> String {
    let fps = sample
        .fps
        .map(|v| format!("{:.1}", v))
        .unwrap_or_else(|| "-".to_string());
    let bitrate = sample.bitrate.as_deref().unwrap_or("-");
    let speed = sample.speed.as_deref().unwrap_or("-");
    format!("fps={} bitrate={} speed={}", fps, bitrate, speed)
}
