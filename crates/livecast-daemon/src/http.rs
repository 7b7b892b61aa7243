//! HTTP API over the status board and the coordinator.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use livecast_proto::display::{format_duration, format_end, format_instant};
use livecast_proto::model::{PollScope, SessionId, StreamDraft, StreamId, TelemetrySample};
use livecast_proto::normalize::{CanonicalStatus, EffectiveEnd, StreamView};
use livecast_proto::{Error, Validation};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::board::{BoardHealth, BoardSnapshot, StatusBoard};
use crate::coordinator::Coordinator;
use crate::logging::RecentLogs;
use crate::poller::PollerHandle;

const MAX_PAGE_SIZE: u32 = 500;

#[derive(Clone)]
pub struct HttpState {
    pub board: Arc<StatusBoard>,
    pub coordinator: Arc<Coordinator>,
    pub poller: PollerHandle,
    pub logs: RecentLogs,
}

// ── response shapes ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ApiBoard {
    cycle: u64,
    scope: PollScope,
    total: usize,
    refreshed_at: Option<DateTime<Utc>>,
    health: BoardHealth,
    streams: Vec<ApiStream>,
}

#[derive(Serialize)]
struct ApiStream {
    id: StreamId,
    name: String,
    stream_key: String,
    asset: Option<String>,
    duration: Option<i32>,
    duration_text: String,
    session_id: Option<SessionId>,
    status: CanonicalStatus,
    effective_start: Option<NaiveDateTime>,
    effective_end: EffectiveEnd,
    start_text: String,
    end_text: String,
    telemetry: Option<TelemetrySample>,
    telemetry_text: Option<String>,
    specification: Option<String>,
}

impl From<&StreamView> for ApiStream {
    fn from(v: &StreamView) -> Self {
        ApiStream {
            id: v.id(),
            name: v.stream.name.clone(),
            stream_key: v.stream.stream_key.clone(),
            asset: v.stream.asset.clone(),
            duration: v.stream.duration,
            duration_text: format_duration(v.stream.duration),
            session_id: v.session_id,
            status: v.status,
            effective_start: v.effective_start,
            effective_end: v.effective_end,
            start_text: format_instant(v.effective_start),
            end_text: format_end(&v.effective_end),
            telemetry: v.telemetry.clone(),
            telemetry_text: v.telemetry_text.clone(),
            specification: v.specification.clone(),
        }
    }
}

impl From<&BoardSnapshot> for ApiBoard {
    fn from(snap: &BoardSnapshot) -> Self {
        ApiBoard {
            cycle: snap.cycle,
            scope: snap.scope.clone(),
            total: snap.total,
            refreshed_at: snap.refreshed_at,
            health: snap.health.clone(),
            streams: snap.views.iter().map(ApiStream::from).collect(),
        }
    }
}

// ── request shapes ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ScopeRequest {
    #[serde(default)]
    owner: Option<i64>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    size: Option<u32>,
}

/// Either two lists or the raw textarea contents.
#[derive(Deserialize)]
#[serde(untagged)]
enum BulkRequest {
    Lists { names: Vec<String>, keys: Vec<String> },
    Text { names_text: String, keys_text: String },
}

#[derive(Deserialize)]
struct BulkDeleteRequest {
    #[serde(default)]
    ids: Vec<StreamId>,
}

// ── errors ────────────────────────────────────────────────────────────────────

pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::ValidationFailed(
                Validation::IllegalTransition { .. } | Validation::AlreadyInFlight(_),
            ) => StatusCode::CONFLICT,
            Error::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Error::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RemoteAcquisitionFailed(_)
            | Error::TransientFetchFailed(_)
            | Error::Rejected { .. }
            | Error::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("HTTP API: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ── server ────────────────────────────────────────────────────────────────────

pub fn router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/streams", get(get_board).post(create_stream))
        .route("/api/streams/bulk", post(bulk_create))
        .route("/api/streams/bulk-delete", post(bulk_delete))
        .route("/api/streams/:id", put(update_stream).delete(delete_stream))
        .route("/api/streams/:id/start", post(start_stream))
        .route("/api/sessions/:id/stop", post(stop_session))
        .route("/api/scope", put(set_scope))
        .route("/api/refresh", post(refresh))
        .route("/api/acquisitions", get(get_acquisitions))
        .route("/api/logs", get(get_logs))
        .layer(cors)
        .with_state(state)
}

pub fn start_server(bind_address: String, port: u16, state: HttpState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);

        let addr = format!("{}:{}", bind_address, port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind HTTP server to {}: {}", addr, e);
                return;
            }
        };

        info!("HTTP API server listening on http://{}", addr);

        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    })
}

// ── handlers ──────────────────────────────────────────────────────────────────

async fn get_board(State(state): State<HttpState>) -> Json<ApiBoard> {
    let snap = state.board.snapshot().await;
    Json(ApiBoard::from(snap.as_ref()))
}

async fn set_scope(
    State(state): State<HttpState>,
    Json(req): Json<ScopeRequest>,
) -> StatusCode {
    let current = state.board.snapshot().await.scope.clone();
    let scope = PollScope {
        owner: req.owner.or(current.owner),
        page: req.page.unwrap_or(current.page),
        size: req.size.unwrap_or(current.size).clamp(1, MAX_PAGE_SIZE),
    };
    info!("HTTP API: scope -> {:?}", scope);
    if !state.poller.set_scope(scope).await {
        error!("Failed to send scope change");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::ACCEPTED
}

async fn refresh(State(state): State<HttpState>) -> StatusCode {
    state.poller.refresh();
    StatusCode::ACCEPTED
}

async fn create_stream(
    State(state): State<HttpState>,
    Json(draft): Json<StreamDraft>,
) -> ApiResult<impl IntoResponse> {
    let created = state.coordinator.create(draft).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_stream(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
    Json(draft): Json<StreamDraft>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.coordinator.update(StreamId(id), draft).await?;
    Ok(Json(updated))
}

async fn delete_stream(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.coordinator.delete(StreamId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_stream(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    info!("HTTP API: start stream {}", id);
    let session = state.coordinator.start_now(StreamId(id)).await?;
    Ok(Json(session))
}

async fn stop_session(
    State(state): State<HttpState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    info!("HTTP API: stop session {}", id);
    let session = state.coordinator.stop_now(SessionId(id)).await?;
    Ok(Json(session))
}

async fn bulk_create(
    State(state): State<HttpState>,
    Json(req): Json<BulkRequest>,
) -> ApiResult<impl IntoResponse> {
    let created = match req {
        BulkRequest::Lists { names, keys } => state.coordinator.bulk_create(names, keys).await?,
        BulkRequest::Text {
            names_text,
            keys_text,
        } => {
            state
                .coordinator
                .bulk_create_text(&names_text, &keys_text)
                .await?
        }
    };
    Ok(Json(serde_json::json!({ "created": created })))
}

async fn bulk_delete(
    State(state): State<HttpState>,
    Json(req): Json<BulkDeleteRequest>,
) -> ApiResult<impl IntoResponse> {
    let deleted = state.coordinator.bulk_delete(req.ids).await?;
    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

async fn get_acquisitions(State(state): State<HttpState>) -> impl IntoResponse {
    Json(state.coordinator.acquirer().jobs().await)
}

async fn get_logs(State(state): State<HttpState>) -> Json<Vec<String>> {
    Json(state.logs.lines())
}
