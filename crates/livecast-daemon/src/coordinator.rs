//! Lifecycle action coordinator.
//!
//! Every user action goes through here.  Actions are checked against the
//! current board before anything is sent, asset references are resolved
//! before a stream is persisted, and each success asks the poller for a
//! refresh.

use std::collections::BTreeSet;
use std::sync::Arc;

use livecast_proto::config::PolicyConfig;
use livecast_proto::model::{
    split_lines, BulkItem, Identity, SessionId, SessionRecord, Stream, StreamDraft, StreamId,
    StreamPayload, UNBOUNDED_DURATION,
};
use livecast_proto::normalize::CanonicalStatus;
use livecast_proto::{Error, Result, Validation};
use tracing::info;

use crate::acquire::Acquirer;
use crate::board::StatusBoard;
use crate::inflight::InFlight;
use crate::poller::PollerHandle;
use crate::services::{SessionService, StreamService};

const DEFAULT_STREAM_NAME: &str = "New stream";

pub struct Coordinator {
    streams: Arc<dyn StreamService>,
    sessions: Arc<dyn SessionService>,
    acquirer: Arc<Acquirer>,
    board: Arc<StatusBoard>,
    poller: PollerHandle,
    identity: Identity,
    policy: PolicyConfig,
    starts: InFlight<StreamId>,
    stops: InFlight<SessionId>,
}

impl Coordinator {
    pub fn new(
        streams: Arc<dyn StreamService>,
        sessions: Arc<dyn SessionService>,
        acquirer: Arc<Acquirer>,
        board: Arc<StatusBoard>,
        poller: PollerHandle,
        identity: Identity,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            streams,
            sessions,
            acquirer,
            board,
            poller,
            identity,
            policy,
            starts: InFlight::new(),
            stops: InFlight::new(),
        }
    }

    pub fn acquirer(&self) -> &Arc<Acquirer> {
        &self.acquirer
    }

    pub async fn create(&self, draft: StreamDraft) -> Result<Stream> {
        let payload = self.prepare(draft).await?;
        let created = self.streams.create_stream(&self.identity, &payload).await?;
        info!("Created stream {} ({})", created.id, created.name);
        self.poller.refresh();
        Ok(created)
    }

    pub async fn update(&self, id: StreamId, draft: StreamDraft) -> Result<Stream> {
        let payload = self.prepare(draft).await?;
        let updated = self
            .streams
            .update_stream(&self.identity, id, &payload)
            .await?;
        info!("Updated stream {}", id);
        self.poller.refresh();
        Ok(updated)
    }

    pub async fn delete(&self, id: StreamId) -> Result<()> {
        self.streams.delete_stream(&self.identity, id).await?;
        info!("Deleted stream {}", id);
        self.poller.refresh();
        Ok(())
    }

    pub async fn start_now(&self, id: StreamId) -> Result<SessionRecord> {
        let Some(_guard) = self.starts.try_claim(id) else {
            return Err(Error::validation(Validation::AlreadyInFlight(format!(
                "start of stream {}",
                id
            ))));
        };

        let status = self.current_status(id).await?;
        let allowed = match status {
            CanonicalStatus::None | CanonicalStatus::Scheduled => true,
            CanonicalStatus::Stopped => self.policy.allow_restart_stopped,
            CanonicalStatus::Active => false,
        };
        if !allowed {
            return Err(Error::validation(Validation::IllegalTransition {
                action: "start",
                status,
            }));
        }

        let session = self.sessions.start_session(&self.identity, id).await?;
        info!("Started stream {} as session {}", id, session.id);
        self.board.note_session(session.clone()).await;
        self.poller.refresh();
        Ok(session)
    }

    pub async fn stop_now(&self, session_id: SessionId) -> Result<SessionRecord> {
        let Some(_guard) = self.stops.try_claim(session_id) else {
            return Err(Error::validation(Validation::AlreadyInFlight(format!(
                "stop of session {}",
                session_id
            ))));
        };

        let view = self
            .board
            .view_for_session(session_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("session {} is not on the board", session_id)))?;
        if view.status != CanonicalStatus::Active {
            return Err(Error::validation(Validation::IllegalTransition {
                action: "stop",
                status: view.status,
            }));
        }

        let session = self.sessions.stop_session(&self.identity, session_id).await?;
        info!("Stopped session {} of stream {}", session_id, view.id());
        self.board.note_session(session.clone()).await;
        self.poller.refresh();
        Ok(session)
    }

    /// One batch request for equally long lists of names and keys.
    pub async fn bulk_create(&self, names: Vec<String>, keys: Vec<String>) -> Result<usize> {
        let names = clean(names);
        let keys = clean(keys);
        if names.is_empty() && keys.is_empty() {
            return Err(Error::validation(Validation::MissingField("names")));
        }
        if names.len() != keys.len() {
            return Err(Error::validation(Validation::CountMismatch {
                names: names.len(),
                keys: keys.len(),
            }));
        }

        let items: Vec<BulkItem> = names
            .into_iter()
            .zip(keys)
            .map(|(name, stream_key)| BulkItem { name, stream_key })
            .collect();
        let created = self.streams.bulk_create(&self.identity, &items).await?;
        info!("Bulk created {} of {} streams", created, items.len());
        self.poller.refresh();
        Ok(created)
    }

    /// Textarea form: one name and one key per line.
    pub async fn bulk_create_text(&self, names: &str, keys: &str) -> Result<usize> {
        self.bulk_create(split_lines(names), split_lines(keys)).await
    }

    pub async fn bulk_delete(&self, ids: Vec<StreamId>) -> Result<usize> {
        let ids: Vec<StreamId> = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Err(Error::validation(Validation::NothingSelected));
        }
        let deleted = self.streams.bulk_delete(&self.identity, &ids).await?;
        info!("Bulk deleted {} of {} streams", deleted, ids.len());
        self.poller.refresh();
        Ok(deleted)
    }

    /// Board status, or the backend's status map for streams on other pages.
    async fn current_status(&self, id: StreamId) -> Result<CanonicalStatus> {
        if let Some(status) = self.board.status_of(id).await {
            return Ok(status);
        }
        let map = self.sessions.status_map(&self.identity, &[id]).await?;
        Ok(map
            .get(&id)
            .map(|s| CanonicalStatus::from(*s))
            .unwrap_or(CanonicalStatus::None))
    }

    /// Validate a draft and resolve its asset.  Nothing is sent to the
    /// metadata service unless this succeeds.
    async fn prepare(&self, draft: StreamDraft) -> Result<StreamPayload> {
        let stream_key = draft.stream_key.trim().to_string();
        if stream_key.is_empty() {
            return Err(Error::validation(Validation::MissingField("stream_key")));
        }
        if let Some(minutes) = draft.duration {
            if minutes < UNBOUNDED_DURATION {
                return Err(Error::validation(Validation::InvalidDuration(minutes)));
            }
        }

        let asset = match draft.asset.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(self.acquirer.acquire(&self.identity, raw).await?),
            _ => None,
        };

        let name = draft
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_STREAM_NAME.to_string());

        Ok(StreamPayload {
            name,
            stream_key,
            asset,
            scheduled_start: draft.scheduled_start,
            duration: draft.duration,
        })
    }
}

fn clean(lines: Vec<String>) -> Vec<String> {
    lines
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}
