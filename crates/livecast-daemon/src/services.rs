//! Remote collaborators the reconciler talks to.
//!
//! Every call takes the caller's `Identity` explicitly; nothing reads
//! credentials from ambient state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use livecast_proto::model::{
    BulkItem, Identity, PollScope, SessionFilter, SessionId, SessionRecord, SessionStatus,
    Stream, StreamId, StreamPage, StreamPayload, TelemetrySample,
};
use livecast_proto::Result;

#[async_trait]
pub trait StreamService: Send + Sync {
    async fn list_streams(&self, who: &Identity, scope: &PollScope) -> Result<StreamPage>;

    async fn create_stream(&self, who: &Identity, payload: &StreamPayload) -> Result<Stream>;

    async fn update_stream(
        &self,
        who: &Identity,
        id: StreamId,
        payload: &StreamPayload,
    ) -> Result<Stream>;

    async fn delete_stream(&self, who: &Identity, id: StreamId) -> Result<()>;

    /// Returns how many streams the backend created.
    async fn bulk_create(&self, who: &Identity, items: &[BulkItem]) -> Result<usize>;

    /// Returns how many streams the backend deleted.
    async fn bulk_delete(&self, who: &Identity, ids: &[StreamId]) -> Result<usize>;
}

#[async_trait]
pub trait SessionService: Send + Sync {
    async fn list_sessions(
        &self,
        who: &Identity,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionRecord>>;

    /// Latest status per stream in one call.  Streams without a record are
    /// absent from the map.
    async fn status_map(
        &self,
        who: &Identity,
        ids: &[StreamId],
    ) -> Result<HashMap<StreamId, SessionStatus>>;

    async fn start_session(&self, who: &Identity, stream_id: StreamId) -> Result<SessionRecord>;

    async fn stop_session(&self, who: &Identity, session_id: SessionId) -> Result<SessionRecord>;
}

#[async_trait]
pub trait TelemetryService: Send + Sync {
    /// `Ok(None)` when the encoder has nothing for this key; that is not an
    /// error.
    async fn sample(&self, who: &Identity, stream_key: &str) -> Result<Option<TelemetrySample>>;
}

/// The download service's answer to a submit.  Acceptance, not completion.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionAck {
    pub accepted: bool,
    pub message: String,
}

#[async_trait]
pub trait AcquisitionService: Send + Sync {
    /// Names of files already present in the storage root.
    async fn list_files(&self, who: &Identity) -> Result<Vec<String>>;

    async fn submit(&self, who: &Identity, link: &str, file_name: &str) -> Result<AcquisitionAck>;
}

/// The three backend-facing services the poller reads from.
#[derive(Clone)]
pub struct Services {
    pub streams: Arc<dyn StreamService>,
    pub sessions: Arc<dyn SessionService>,
    pub telemetry: Arc<dyn TelemetryService>,
}

impl Services {
    /// All three backed by the same client.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: StreamService + SessionService + TelemetryService + 'static,
    {
        Self {
            streams: backend.clone(),
            sessions: backend.clone(),
            telemetry: backend,
        }
    }
}
