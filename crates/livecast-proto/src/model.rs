use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Duration value meaning "runs until stopped".
pub const UNBOUNDED_DURATION: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller context passed into every remote call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Bearer token forwarded to the backend, if the deployment uses one.
    #[serde(default)]
    pub token: Option<String>,
}

/// A scheduled broadcast as stored by the metadata service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    pub id: StreamId,
    pub name: String,
    pub stream_key: String,
    #[serde(default)]
    pub scheduled_start: Option<NaiveDateTime>,
    /// Minutes; `UNBOUNDED_DURATION` means no planned end.
    #[serde(default)]
    pub duration: Option<i32>,
    /// Resolved local path of the media file.
    #[serde(default)]
    pub asset: Option<String>,
}

impl Stream {
    pub fn is_unbounded(&self) -> bool {
        self.duration == Some(UNBOUNDED_DURATION)
    }
}

/// Lifecycle status as persisted on a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive, since the backend is not consistent about casing.
impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(SessionStatus::Scheduled),
            "ACTIVE" => Ok(SessionStatus::Active),
            "STOPPED" => Ok(SessionStatus::Stopped),
            other => Err(format!("unknown session status: {}", other)),
        }
    }
}

/// Backend evidence that a stream was started or stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: SessionId,
    pub stream_id: StreamId,
    pub status: SessionStatus,
    #[serde(default)]
    pub started_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub stopped_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub specification: Option<String>,
}

/// Live encoder statistics for one stream key.  Display only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(default)]
    pub fps: Option<f64>,
    /// e.g. `2500.1kbits/s`
    #[serde(default)]
    pub bitrate: Option<String>,
    /// e.g. `1.01x`
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub frame: Option<u64>,
    #[serde(default)]
    pub time: Option<String>,
    /// Epoch milliseconds of the encoder's last report.
    #[serde(default)]
    pub updated_at: Option<i64>,
}

/// Create/update form as entered by the user.  `asset` may be a share link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stream_key: String,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub scheduled_start: Option<NaiveDateTime>,
    #[serde(default)]
    pub duration: Option<i32>,
}

/// Payload the metadata service receives, after asset resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPayload {
    pub name: String,
    pub stream_key: String,
    pub asset: Option<String>,
    pub scheduled_start: Option<NaiveDateTime>,
    pub duration: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkItem {
    pub name: String,
    pub stream_key: String,
}

/// Which page of whose streams the poller keeps fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollScope {
    #[serde(default)]
    pub owner: Option<i64>,
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    50
}

impl Default for PollScope {
    fn default() -> Self {
        Self {
            owner: None,
            page: 0,
            size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamPage {
    pub streams: Vec<Stream>,
    pub total: usize,
}

/// Session list filter; empty `stream_ids` means "all of the caller's".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionFilter {
    pub status: Option<SessionStatus>,
    pub stream_ids: Vec<StreamId>,
}

/// Split textarea input into trimmed, non-empty lines.
pub fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
