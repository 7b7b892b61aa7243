//! In-process fakes for the remote services.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use livecast_proto::model::{
    BulkItem, Identity, PollScope, SessionFilter, SessionId, SessionRecord, SessionStatus,
    Stream, StreamId, StreamPage, StreamPayload, TelemetrySample,
};
use livecast_proto::normalize::index_records;
use livecast_proto::{Error, Result};

use crate::services::{
    AcquisitionAck, AcquisitionService, SessionService, StreamService, TelemetryService,
};

pub fn stream(id: i64, name: &str) -> Stream {
    Stream {
        id: StreamId(id),
        name: name.to_string(),
        stream_key: format!("key-{}", id),
        scheduled_start: None,
        duration: Some(60),
        asset: None,
    }
}

pub fn scheduled(id: i64, name: &str) -> Stream {
    Stream {
        scheduled_start: NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(10, 0, 0)),
        ..stream(id, name)
    }
}

pub fn record(id: i64, stream_id: i64, status: SessionStatus) -> SessionRecord {
    SessionRecord {
        id: SessionId(id),
        stream_id: StreamId(stream_id),
        status,
        started_at: None,
        stopped_at: None,
        specification: None,
    }
}

pub fn sample(fps: f64) -> TelemetrySample {
    TelemetrySample {
        fps: Some(fps),
        bitrate: Some("2500kbits/s".into()),
        speed: Some("1.0x".into()),
        ..Default::default()
    }
}

// ── FakeBackend ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct BackendState {
    streams: Vec<Stream>,
    records: Vec<SessionRecord>,
    telemetry: HashMap<String, TelemetrySample>,
    failing_telemetry: HashSet<String>,
    fail_streams: bool,
    sessions_not_found: bool,
    list_delay: Option<Duration>,
    start_delay: Option<Duration>,
    reject_start: Option<String>,
    stream_list_calls: usize,
    session_list_calls: usize,
    sampled: Vec<String>,
    mutations: Vec<String>,
    payloads: Vec<StreamPayload>,
    bulk_items: Vec<BulkItem>,
    next_id: i64,
}

/// Stream, session and telemetry services over in-memory vectors.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<BackendState>,
}

impl FakeBackend {
    pub fn with_streams(streams: Vec<Stream>) -> Self {
        let next_id = streams.iter().map(|s| s.id.0).max().unwrap_or(0) + 1;
        Self {
            state: Mutex::new(BackendState {
                streams,
                next_id,
                ..Default::default()
            }),
        }
    }

    pub fn set_records(&self, records: Vec<SessionRecord>) {
        self.state.lock().unwrap().records = records;
    }

    pub fn set_telemetry(&self, key: &str, sample: TelemetrySample) {
        self.state
            .lock()
            .unwrap()
            .telemetry
            .insert(key.to_string(), sample);
    }

    pub fn fail_telemetry(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_telemetry
            .insert(key.to_string());
    }

    pub fn fail_streams(&self, fail: bool) {
        self.state.lock().unwrap().fail_streams = fail;
    }

    pub fn sessions_not_found(&self, on: bool) {
        self.state.lock().unwrap().sessions_not_found = on;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.state.lock().unwrap().list_delay = Some(delay);
    }

    pub fn set_start_delay(&self, delay: Duration) {
        self.state.lock().unwrap().start_delay = Some(delay);
    }

    pub fn reject_start(&self, message: &str) {
        self.state.lock().unwrap().reject_start = Some(message.to_string());
    }

    pub fn stream_list_calls(&self) -> usize {
        self.state.lock().unwrap().stream_list_calls
    }

    pub fn session_list_calls(&self) -> usize {
        self.state.lock().unwrap().session_list_calls
    }

    pub fn sampled_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().sampled.clone()
    }

    /// Every state-changing call, in order, e.g. `start:3`.
    pub fn mutations(&self) -> Vec<String> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn payloads(&self) -> Vec<StreamPayload> {
        self.state.lock().unwrap().payloads.clone()
    }

    pub fn bulk_items(&self) -> Vec<BulkItem> {
        self.state.lock().unwrap().bulk_items.clone()
    }

    fn record_mutation(&self, what: String) {
        self.state.lock().unwrap().mutations.push(what);
    }
}

#[async_trait]
impl StreamService for FakeBackend {
    async fn list_streams(&self, _who: &Identity, scope: &PollScope) -> Result<StreamPage> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.stream_list_calls += 1;
            state.list_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.fail_streams {
            return Err(Error::Transport("connection refused".into()));
        }
        let start = (scope.page * scope.size) as usize;
        Ok(StreamPage {
            streams: state
                .streams
                .iter()
                .skip(start)
                .take(scope.size as usize)
                .cloned()
                .collect(),
            total: state.streams.len(),
        })
    }

    async fn create_stream(&self, _who: &Identity, payload: &StreamPayload) -> Result<Stream> {
        self.record_mutation("create".into());
        let mut state = self.state.lock().unwrap();
        state.payloads.push(payload.clone());
        let id = StreamId(state.next_id);
        state.next_id += 1;
        let created = Stream {
            id,
            name: payload.name.clone(),
            stream_key: payload.stream_key.clone(),
            scheduled_start: payload.scheduled_start,
            duration: payload.duration,
            asset: payload.asset.clone(),
        };
        state.streams.push(created.clone());
        Ok(created)
    }

    async fn update_stream(
        &self,
        _who: &Identity,
        id: StreamId,
        payload: &StreamPayload,
    ) -> Result<Stream> {
        self.record_mutation(format!("update:{}", id));
        let mut state = self.state.lock().unwrap();
        state.payloads.push(payload.clone());
        let existing = state
            .streams
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| Error::NotFound(format!("stream {}", id)))?;
        existing.name = payload.name.clone();
        existing.stream_key = payload.stream_key.clone();
        existing.asset = payload.asset.clone();
        Ok(existing.clone())
    }

    async fn delete_stream(&self, _who: &Identity, id: StreamId) -> Result<()> {
        self.record_mutation(format!("delete:{}", id));
        self.state.lock().unwrap().streams.retain(|s| s.id != id);
        Ok(())
    }

    async fn bulk_create(&self, _who: &Identity, items: &[BulkItem]) -> Result<usize> {
        self.record_mutation(format!("bulk_create:{}", items.len()));
        self.state
            .lock()
            .unwrap()
            .bulk_items
            .extend(items.iter().cloned());
        Ok(items.len())
    }

    async fn bulk_delete(&self, _who: &Identity, ids: &[StreamId]) -> Result<usize> {
        self.record_mutation(format!("bulk_delete:{}", ids.len()));
        self.state
            .lock()
            .unwrap()
            .streams
            .retain(|s| !ids.contains(&s.id));
        Ok(ids.len())
    }
}

#[async_trait]
impl SessionService for FakeBackend {
    async fn list_sessions(
        &self,
        _who: &Identity,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionRecord>> {
        let mut state = self.state.lock().unwrap();
        state.session_list_calls += 1;
        if state.sessions_not_found {
            return Err(Error::NotFound("no sessions".into()));
        }
        Ok(state
            .records
            .iter()
            .filter(|r| filter.stream_ids.is_empty() || filter.stream_ids.contains(&r.stream_id))
            .filter(|r| filter.status.map_or(true, |s| s == r.status))
            .cloned()
            .collect())
    }

    async fn status_map(
        &self,
        _who: &Identity,
        ids: &[StreamId],
    ) -> Result<HashMap<StreamId, SessionStatus>> {
        let state = self.state.lock().unwrap();
        Ok(index_records(&state.records)
            .into_iter()
            .filter(|(id, _)| ids.contains(id))
            .map(|(id, r)| (id, r.status))
            .collect())
    }

    async fn start_session(&self, _who: &Identity, stream_id: StreamId) -> Result<SessionRecord> {
        self.record_mutation(format!("start:{}", stream_id));
        let delay = self.state.lock().unwrap().start_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.reject_start.clone() {
            return Err(Error::Rejected {
                status: 400,
                message,
            });
        }
        let id = state.records.iter().map(|r| r.id.0).max().unwrap_or(0) + 1;
        let started = record(id, stream_id.0, SessionStatus::Active);
        state.records.push(started.clone());
        Ok(started)
    }

    async fn stop_session(&self, _who: &Identity, session_id: SessionId) -> Result<SessionRecord> {
        self.record_mutation(format!("stop:{}", session_id));
        let mut state = self.state.lock().unwrap();
        let existing = state
            .records
            .iter_mut()
            .find(|r| r.id == session_id)
            .ok_or_else(|| Error::NotFound(format!("session {}", session_id)))?;
        existing.status = SessionStatus::Stopped;
        Ok(existing.clone())
    }
}

#[async_trait]
impl TelemetryService for FakeBackend {
    async fn sample(&self, _who: &Identity, stream_key: &str) -> Result<Option<TelemetrySample>> {
        let mut state = self.state.lock().unwrap();
        state.sampled.push(stream_key.to_string());
        if state.failing_telemetry.contains(stream_key) {
            return Err(Error::Transport("timed out".into()));
        }
        Ok(state.telemetry.get(stream_key).cloned())
    }
}

// ── FakeAcquisition ───────────────────────────────────────────────────────────

#[derive(Default)]
struct AcquisitionState {
    files: Vec<String>,
    appear_after_first_list: Option<String>,
    list_calls: usize,
    unreachable: bool,
    reject: Option<String>,
    submit_delay: Option<Duration>,
    submitted: Vec<String>,
}

#[derive(Default)]
pub struct FakeAcquisition {
    state: Mutex<AcquisitionState>,
}

impl FakeAcquisition {
    pub fn with_files(files: &[&str]) -> Self {
        Self {
            state: Mutex::new(AcquisitionState {
                files: files.iter().map(|f| f.to_string()).collect(),
                ..Default::default()
            }),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().reject = Some(message.to_string());
        fake
    }

    pub fn unreachable() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().unreachable = true;
        fake
    }

    /// Simulate another client grabbing `name` between the two listings.
    pub fn add_file_after_first_list(&self, name: &str) {
        self.state.lock().unwrap().appear_after_first_list = Some(name.to_string());
    }

    pub fn set_submit_delay(&self, delay: Duration) {
        self.state.lock().unwrap().submit_delay = Some(delay);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }
}

#[async_trait]
impl AcquisitionService for FakeAcquisition {
    async fn list_files(&self, _who: &Identity) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        if state.unreachable {
            return Err(Error::Transport("connection refused".into()));
        }
        state.list_calls += 1;
        if state.list_calls == 2 {
            if let Some(name) = state.appear_after_first_list.take() {
                state.files.push(name);
            }
        }
        Ok(state.files.clone())
    }

    async fn submit(&self, _who: &Identity, _link: &str, file_name: &str) -> Result<AcquisitionAck> {
        let delay = self.state.lock().unwrap().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.reject.clone() {
            return Ok(AcquisitionAck {
                accepted: false,
                message,
            });
        }
        state.submitted.push(file_name.to_string());
        state.files.push(file_name.to_string());
        Ok(AcquisitionAck {
            accepted: true,
            message: "Download started".into(),
        })
    }
}
