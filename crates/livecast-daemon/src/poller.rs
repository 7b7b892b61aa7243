//! Polling engine.
//!
//! Keeps the status board fresh: a fixed interval plus on-demand refreshes
//! after mutations and scope changes.  At most one cycle runs at a time;
//! ticks that land while one is in flight are skipped, on-demand triggers
//! cancel it and start over.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use livecast_proto::display::natural_cmp;
use livecast_proto::error::empty_if_not_found;
use livecast_proto::model::{Identity, PollScope, SessionFilter, StreamId};
use livecast_proto::normalize::{index_records, normalize, CanonicalStatus, StreamView};
use livecast_proto::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::board::{CycleTicket, StatusBoard};
use crate::services::Services;

// ── PollEvent ─────────────────────────────────────────────────────────────────

/// On-demand inputs into the engine loop.  Interval ticks and shutdown are
/// handled inside the loop itself.
#[derive(Debug)]
pub enum PollEvent {
    /// Refresh now, superseding any cycle in flight.
    Refresh,
    /// Switch page or owner, then refresh.
    ScopeChanged(PollScope),
}

/// Cheap handle the coordinator and HTTP layer use to poke the engine.
#[derive(Clone)]
pub struct PollerHandle {
    tx: mpsc::Sender<PollEvent>,
}

impl PollerHandle {
    pub fn channel() -> (Self, mpsc::Receiver<PollEvent>) {
        let (tx, rx) = mpsc::channel(16);
        (Self { tx }, rx)
    }

    /// Never blocks.  A full queue already holds a pending refresh.
    pub fn refresh(&self) {
        if let Err(mpsc::error::TrySendError::Closed(_)) = self.tx.try_send(PollEvent::Refresh) {
            warn!("Refresh requested after the poller stopped");
        }
    }

    pub async fn set_scope(&self, scope: PollScope) -> bool {
        self.tx.send(PollEvent::ScopeChanged(scope)).await.is_ok()
    }
}

// ── cycle ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Applied,
    /// Finished, but a newer cycle or another scope got there first.
    Stale,
    Failed(String),
    Cancelled,
}

/// One fetch, normalize, telemetry round.
pub async fn run_cycle(
    services: &Services,
    who: &Identity,
    board: &StatusBoard,
    cancel: &CancellationToken,
) -> CycleOutcome {
    let ticket = board.begin_cycle().await;
    debug!("Cycle {} starting for {:?}", ticket.seq, ticket.scope);

    let page = match services.streams.list_streams(who, &ticket.scope).await {
        Ok(page) => page,
        Err(Error::NotFound(_)) => Default::default(),
        Err(e) => return fail(board, &ticket, cancel, e).await,
    };
    if cancel.is_cancelled() {
        return CycleOutcome::Cancelled;
    }

    let ids: Vec<StreamId> = page.streams.iter().map(|s| s.id).collect();
    let records = if ids.is_empty() {
        Vec::new()
    } else {
        let filter = SessionFilter {
            status: None,
            stream_ids: ids,
        };
        match empty_if_not_found(services.sessions.list_sessions(who, &filter).await) {
            Ok(records) => records,
            Err(e) => return fail(board, &ticket, cancel, e).await,
        }
    };
    if cancel.is_cancelled() {
        return CycleOutcome::Cancelled;
    }

    let by_stream = index_records(&records);
    let mut views: Vec<StreamView> = page
        .streams
        .iter()
        .map(|s| normalize(s, by_stream.get(&s.id).copied(), None))
        .collect();
    views.sort_by(by_name);

    attach_telemetry(services, who, &mut views).await;
    if cancel.is_cancelled() {
        return CycleOutcome::Cancelled;
    }

    if board.apply(&ticket, views, page.total).await {
        CycleOutcome::Applied
    } else {
        CycleOutcome::Stale
    }
}

fn by_name(a: &StreamView, b: &StreamView) -> Ordering {
    natural_cmp(&a.stream.name, &b.stream.name).then(a.id().cmp(&b.id()))
}

/// One parallel batch for the streams that came out ACTIVE.  A failed
/// sample only costs that stream its telemetry.
async fn attach_telemetry(services: &Services, who: &Identity, views: &mut [StreamView]) {
    let active: Vec<usize> = views
        .iter()
        .enumerate()
        .filter(|(_, v)| v.status == CanonicalStatus::Active && !v.stream.stream_key.is_empty())
        .map(|(i, _)| i)
        .collect();
    if active.is_empty() {
        return;
    }

    let samples = join_all(active.iter().map(|&i| {
        let key = views[i].stream.stream_key.clone();
        let telemetry = Arc::clone(&services.telemetry);
        async move { telemetry.sample(who, &key).await }
    }))
    .await;

    for (i, sample) in active.into_iter().zip(samples) {
        match sample {
            Ok(sample) => views[i].attach_telemetry(sample),
            Err(e) => {
                warn!("Telemetry for {} unavailable: {}", views[i].stream.name, e);
                views[i].attach_telemetry(None);
            }
        }
    }
}

/// A superseded cycle leaves the board alone; the newer one decides health.
async fn fail(
    board: &StatusBoard,
    ticket: &CycleTicket,
    cancel: &CancellationToken,
    err: Error,
) -> CycleOutcome {
    if cancel.is_cancelled() {
        debug!("Cycle {} failed after being superseded: {}", ticket.seq, err);
        return CycleOutcome::Cancelled;
    }
    let message = Error::TransientFetchFailed(err.to_string()).to_string();
    warn!("Cycle {}: {}", ticket.seq, message);
    if board.mark_failed(ticket, message.clone()).await {
        CycleOutcome::Failed(message)
    } else {
        CycleOutcome::Stale
    }
}

// ── PollingEngine ─────────────────────────────────────────────────────────────

struct InFlightCycle {
    cancel: CancellationToken,
    task: JoinHandle<CycleOutcome>,
}

pub struct PollingEngine {
    services: Services,
    identity: Identity,
    board: Arc<StatusBoard>,
    interval: Duration,
    shutdown: CancellationToken,
    current: Option<InFlightCycle>,
}

impl PollingEngine {
    pub fn new(
        services: Services,
        identity: Identity,
        board: Arc<StatusBoard>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            services,
            identity,
            board,
            interval,
            shutdown,
            current: None,
        }
    }

    /// Run until the shutdown token fires or every handle is dropped.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<PollEvent>) {
        info!("Poller: every {:?}", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Poller: shutdown requested");
                    break;
                }

                _ = ticker.tick() => {
                    if self.cycle_running() {
                        debug!("Poller: tick skipped, cycle still in flight");
                    } else {
                        self.start_cycle();
                    }
                }

                evt = event_rx.recv() => match evt {
                    None => {
                        info!("Poller: event channel closed");
                        break;
                    }
                    Some(PollEvent::Refresh) => {
                        debug!("Poller: on-demand refresh");
                        self.start_cycle();
                    }
                    Some(PollEvent::ScopeChanged(scope)) => {
                        let epoch = self.board.set_scope(scope).await;
                        debug!("Poller: scope changed, epoch {}", epoch);
                        self.start_cycle();
                    }
                },
            }
        }

        if let Some(cycle) = self.current.take() {
            cycle.cancel.cancel();
        }
    }

    fn cycle_running(&self) -> bool {
        self.current
            .as_ref()
            .map_or(false, |c| !c.task.is_finished())
    }

    /// Cancel whatever is in flight and start a fresh cycle.
    fn start_cycle(&mut self) {
        if let Some(old) = self.current.take() {
            if !old.task.is_finished() {
                debug!("Poller: superseding in-flight cycle");
            }
            old.cancel.cancel();
        }

        let cancel = self.shutdown.child_token();
        let services = self.services.clone();
        let identity = self.identity.clone();
        let board = Arc::clone(&self.board);
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let outcome = run_cycle(&services, &identity, &board, &token).await;
            debug!("Poller: cycle finished: {:?}", outcome);
            outcome
        });
        self.current = Some(InFlightCycle { cancel, task });
    }
}
