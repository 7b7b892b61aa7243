//! reqwest clients for the backend REST API and the download service.

use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use livecast_proto::config::{AcquisitionConfig, BackendConfig};
use livecast_proto::model::{
    BulkItem, Identity, PollScope, SessionFilter, SessionId, SessionRecord, SessionStatus,
    Stream, StreamId, StreamPage, StreamPayload, TelemetrySample,
};
use livecast_proto::{Error, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::services::{
    AcquisitionAck, AcquisitionService, SessionService, StreamService, TelemetryService,
};

const USER_AGENT: &str = concat!("livecast-daemon/", env!("CARGO_PKG_VERSION"));

// ── wire shapes ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStream {
    id: i64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    key_stream: Option<String>,
    #[serde(default)]
    time_start: Option<NaiveDateTime>,
    #[serde(default)]
    duration: Option<i32>,
    #[serde(default)]
    video_list: Option<String>,
}

impl From<WireStream> for Stream {
    fn from(w: WireStream) -> Self {
        Stream {
            id: StreamId(w.id),
            name: w.name.unwrap_or_default(),
            stream_key: w.key_stream.unwrap_or_default().trim().to_string(),
            scheduled_start: w.time_start,
            duration: w.duration,
            asset: w
                .video_list
                .as_deref()
                .and_then(|v| v.lines().map(str::trim).find(|l| !l.is_empty()))
                .map(str::to_string),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStreamList {
    #[serde(default)]
    streams: Vec<WireStream>,
    #[serde(default)]
    total_elements: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct WireStreamRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSession {
    id: i64,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    started_at: Option<NaiveDateTime>,
    #[serde(default)]
    stopped_at: Option<NaiveDateTime>,
    #[serde(default)]
    specification: Option<String>,
    #[serde(default)]
    stream: Option<WireStreamRef>,
    #[serde(default)]
    stream_id: Option<i64>,
}

impl WireSession {
    /// `None` when the record cannot be tied to a stream or has a status we
    /// do not understand.
    fn into_record(self) -> Option<SessionRecord> {
        let stream_id = self.stream_id.or(self.stream.as_ref().map(|s| s.id))?;
        let status = match self.status.as_deref().map(str::parse::<SessionStatus>) {
            Some(Ok(s)) => s,
            Some(Err(e)) => {
                warn!("Skipping session {}: {}", self.id, e);
                return None;
            }
            None => {
                warn!("Skipping session {}: no status", self.id);
                return None;
            }
        };
        Some(SessionRecord {
            id: SessionId(self.id),
            stream_id: StreamId(stream_id),
            status,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            specification: self.specification,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSessionList {
    #[serde(default)]
    stream_sessions: Vec<WireSession>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSessionEnvelope {
    stream_session: WireSession,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStatusMap {
    #[serde(default)]
    status_map: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSample {
    #[serde(default)]
    frame: Option<u64>,
    #[serde(default)]
    fps: Option<f64>,
    #[serde(default)]
    bitrate: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    speed: Option<String>,
    #[serde(default)]
    updated_at: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct WireStat {
    #[serde(default)]
    stat: Option<WireSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload<'a> {
    name: &'a str,
    key_stream: &'a str,
    video_list: Option<&'a str>,
    time_start: Option<NaiveDateTime>,
    duration: Option<i32>,
}

impl<'a> From<&'a StreamPayload> for WirePayload<'a> {
    fn from(p: &'a StreamPayload) -> Self {
        WirePayload {
            name: &p.name,
            key_stream: &p.stream_key,
            video_list: p.asset.as_deref(),
            time_start: p.scheduled_start,
            duration: p.duration,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBulkItem<'a> {
    name: &'a str,
    key_stream: &'a str,
}

#[derive(Debug, Deserialize)]
struct WireCount {
    #[serde(default)]
    created: Option<usize>,
    #[serde(default)]
    deleted: Option<usize>,
    #[serde(default)]
    count: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    file_name: String,
}

#[derive(Debug, Deserialize)]
struct WireFileList {
    #[serde(default)]
    files: Vec<WireFile>,
}

#[derive(Debug, Serialize)]
struct WireDownload<'a> {
    file_type: &'static str,
    file_id_or_url: &'a str,
    file_name: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ── shared plumbing ───────────────────────────────────────────────────────────

fn build_http(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

fn parse_base(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid base URL: {}", raw))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Base URL cannot carry a path: {}", raw);
    }
    Ok(url)
}

/// `base` with `segments` appended, each percent-encoded.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn with_identity(req: RequestBuilder, who: &Identity) -> RequestBuilder {
    let req = match &who.token {
        Some(token) => req.bearer_auth(token),
        None => req,
    };
    match who.user_id {
        Some(id) => req.header("X-User-Id", id.to_string()),
        None => req,
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

/// Send and map non-success statuses onto the error taxonomy.
async fn send(req: RequestBuilder, what: &str) -> Result<Response> {
    let response = req.send().await.map_err(transport)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body: WireMessage = response.json().await.unwrap_or_default();
    let message = body
        .message
        .or(body.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    debug!("{} failed: {} {}", what, status, message);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::NotAuthenticated,
        StatusCode::NOT_FOUND => Error::NotFound(format!("{}: {}", what, message)),
        _ => Error::Rejected {
            status: status.as_u16(),
            message,
        },
    })
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder, what: &str) -> Result<T> {
    let response = send(req, what).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Transport(format!("{}: bad response body: {}", what, e)))
}

// ── BackendClient ─────────────────────────────────────────────────────────────

/// Stream metadata, session and telemetry endpoints of the backend.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_http(config.request_timeout())?,
            base: parse_base(&config.base_url)?,
        })
    }

    fn request(&self, method: Method, segments: &[&str], who: &Identity) -> RequestBuilder {
        with_identity(self.http.request(method, endpoint(&self.base, segments)), who)
    }

    fn owner_query(who: &Identity) -> Vec<(&'static str, String)> {
        who.user_id
            .map(|id| vec![("userId", id.to_string())])
            .unwrap_or_default()
    }
}

#[async_trait]
impl StreamService for BackendClient {
    async fn list_streams(&self, who: &Identity, scope: &PollScope) -> Result<StreamPage> {
        let mut query = vec![
            ("page", scope.page.to_string()),
            ("size", scope.size.to_string()),
            ("sort", "name,asc".to_string()),
        ];
        if let Some(owner) = scope.owner.or(who.user_id) {
            query.push(("userId", owner.to_string()));
        }

        let list: WireStreamList = send_json(
            self.request(Method::GET, &["streams"], who).query(&query),
            "list streams",
        )
        .await?;

        let streams: Vec<Stream> = list.streams.into_iter().map(Stream::from).collect();
        Ok(StreamPage {
            total: list.total_elements.unwrap_or(streams.len()),
            streams,
        })
    }

    async fn create_stream(&self, who: &Identity, payload: &StreamPayload) -> Result<Stream> {
        let value: serde_json::Value = send_json(
            self.request(Method::POST, &["streams"], who)
                .query(&Self::owner_query(who))
                .json(&WirePayload::from(payload)),
            "create stream",
        )
        .await?;
        decode_stream(value, "create stream")
    }

    async fn update_stream(
        &self,
        who: &Identity,
        id: StreamId,
        payload: &StreamPayload,
    ) -> Result<Stream> {
        let value: serde_json::Value = send_json(
            self.request(Method::PUT, &["streams", &id.to_string()], who)
                .json(&WirePayload::from(payload)),
            "update stream",
        )
        .await?;
        decode_stream(value, "update stream")
    }

    async fn delete_stream(&self, who: &Identity, id: StreamId) -> Result<()> {
        send(
            self.request(Method::DELETE, &["streams", &id.to_string()], who),
            "delete stream",
        )
        .await?;
        Ok(())
    }

    async fn bulk_create(&self, who: &Identity, items: &[BulkItem]) -> Result<usize> {
        let wire: Vec<WireBulkItem<'_>> = items
            .iter()
            .map(|i| WireBulkItem {
                name: &i.name,
                key_stream: &i.stream_key,
            })
            .collect();
        let count: WireCount = send_json(
            self.request(Method::POST, &["streams", "bulk"], who)
                .query(&Self::owner_query(who))
                .json(&serde_json::json!({ "items": wire })),
            "bulk create",
        )
        .await?;
        Ok(count.created.or(count.count).unwrap_or(items.len()))
    }

    async fn bulk_delete(&self, who: &Identity, ids: &[StreamId]) -> Result<usize> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let count: WireCount = send_json(
            self.request(Method::DELETE, &["streams", "bulk"], who)
                .json(&serde_json::json!({ "ids": raw })),
            "bulk delete",
        )
        .await?;
        Ok(count.deleted.or(count.count).unwrap_or(ids.len()))
    }
}

/// Mutations answer either with the stream itself or `{"stream": {...}}`.
fn decode_stream(value: serde_json::Value, what: &str) -> Result<Stream> {
    let inner = match value.get("stream") {
        Some(s) if s.is_object() => s.clone(),
        _ => value,
    };
    serde_json::from_value::<WireStream>(inner)
        .map(Stream::from)
        .map_err(|e| Error::Transport(format!("{}: bad response body: {}", what, e)))
}

#[async_trait]
impl SessionService for BackendClient {
    async fn list_sessions(
        &self,
        who: &Identity,
        filter: &SessionFilter,
    ) -> Result<Vec<SessionRecord>> {
        let mut query = Self::owner_query(who);
        query.push(("sort", "id,desc".to_string()));
        if let Some(status) = filter.status {
            query.push(("status", status.as_str().to_string()));
        }
        if !filter.stream_ids.is_empty() {
            query.push(("streamIds", join_ids(&filter.stream_ids)));
        }

        let list: WireSessionList = send_json(
            self.request(Method::GET, &["stream-sessions", "list"], who)
                .query(&query),
            "list sessions",
        )
        .await?;

        // The backend may ignore the filter parameters; apply them here too.
        Ok(list
            .stream_sessions
            .into_iter()
            .filter_map(WireSession::into_record)
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.stream_ids.is_empty() || filter.stream_ids.contains(&r.stream_id))
            .collect())
    }

    async fn status_map(
        &self,
        who: &Identity,
        ids: &[StreamId],
    ) -> Result<HashMap<StreamId, SessionStatus>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let wire: WireStatusMap = send_json(
            self.request(Method::GET, &["stream-sessions", "status-map"], who)
                .query(&[("streamIds", join_ids(ids))]),
            "status map",
        )
        .await?;

        Ok(wire
            .status_map
            .into_iter()
            .filter_map(|(k, v)| {
                let id = k.trim().parse::<i64>().ok()?;
                let status = v.parse::<SessionStatus>().ok()?;
                Some((StreamId(id), status))
            })
            .collect())
    }

    async fn start_session(&self, who: &Identity, stream_id: StreamId) -> Result<SessionRecord> {
        let env: WireSessionEnvelope = send_json(
            self.request(
                Method::POST,
                &["stream-sessions", "start", &stream_id.to_string()],
                who,
            ),
            "start session",
        )
        .await?;
        let mut wire = env.stream_session;
        wire.stream_id.get_or_insert(stream_id.0);
        wire.into_record()
            .ok_or_else(|| Error::Transport("start session: unusable session record".into()))
    }

    async fn stop_session(&self, who: &Identity, session_id: SessionId) -> Result<SessionRecord> {
        let env: WireSessionEnvelope = send_json(
            self.request(
                Method::POST,
                &["stream-sessions", &session_id.to_string()],
                who,
            ),
            "stop session",
        )
        .await?;
        env.stream_session
            .into_record()
            .ok_or_else(|| Error::Transport("stop session: unusable session record".into()))
    }
}

#[async_trait]
impl TelemetryService for BackendClient {
    async fn sample(&self, who: &Identity, stream_key: &str) -> Result<Option<TelemetrySample>> {
        let stat: WireStat = match send_json(
            self.request(
                Method::GET,
                &["stream-sessions", "ffmpeg-stat", stream_key],
                who,
            ),
            "telemetry",
        )
        .await
        {
            Ok(s) => s,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        Ok(stat.stat.map(|s| TelemetrySample {
            fps: s.fps,
            bitrate: s.bitrate,
            speed: s.speed,
            frame: s.frame,
            time: s.time,
            updated_at: s.updated_at,
        }))
    }
}

fn join_ids(ids: &[StreamId]) -> String {
    ids.iter()
        .map(|id| id.0.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

// ── AcquisitionClient ─────────────────────────────────────────────────────────

/// Client for the download service that fetches shared files into the
/// storage root.
#[derive(Clone)]
pub struct AcquisitionClient {
    http: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
}

impl AcquisitionClient {
    pub fn new(config: &AcquisitionConfig, timeout: std::time::Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: build_http(timeout)?,
            base: parse_base(&config.base_url)?,
            auth_token: config.auth_token.clone(),
        })
    }

    /// The download service only knows its own token; the backend bearer
    /// is never forwarded to it.
    fn request(&self, method: Method, segment: &str, who: &Identity) -> RequestBuilder {
        let mut req = self.http.request(method, endpoint(&self.base, &[segment]));
        if let Some(id) = who.user_id {
            req = req.header("X-User-Id", id.to_string());
        }
        match &self.auth_token {
            Some(token) => req.header(reqwest::header::AUTHORIZATION, token),
            None => req,
        }
    }
}

#[async_trait]
impl AcquisitionService for AcquisitionClient {
    async fn list_files(&self, who: &Identity) -> Result<Vec<String>> {
        let list: WireFileList =
            send_json(self.request(Method::GET, "list_files", who), "list files").await?;
        Ok(list.files.into_iter().map(|f| f.file_name).collect())
    }

    async fn submit(&self, who: &Identity, link: &str, file_name: &str) -> Result<AcquisitionAck> {
        let response = self
            .request(Method::POST, "download", who)
            .json(&WireDownload {
                file_type: "drive",
                file_id_or_url: link.trim(),
                file_name,
            })
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body: WireMessage = response.json().await.unwrap_or_default();
        if status.is_success() {
            Ok(AcquisitionAck {
                accepted: true,
                message: body
                    .message
                    .unwrap_or_else(|| "Download started".to_string()),
            })
        } else {
            Ok(AcquisitionAck {
                accepted: false,
                message: body
                    .error
                    .or(body.message)
                    .unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::StatusCode as AxumStatus;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::json;
    use tokio::net::TcpListener;

    /// Serve `app` on an ephemeral port and return its base URL.
    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api", addr)
    }

    fn mock_backend() -> Router {
        Router::new()
            .route(
                "/api/streams",
                get(|Query(q): Query<HashMap<String, String>>| async move {
                    assert_eq!(q.get("userId").map(String::as_str), Some("4"));
                    Json(json!({
                        "streams": [
                            {"id": 1, "name": "Demo 1", "keyStream": " k1 ",
                             "timeStart": "2024-05-01T10:00:00", "duration": -1,
                             "videoList": "\n/srv/v/1.mp4\n/srv/v/2.mp4"},
                            {"id": 2, "name": "Demo 2", "keyStream": "k2"}
                        ],
                        "totalElements": 12
                    }))
                }),
            )
            .route(
                "/api/stream-sessions/list",
                get(|| async {
                    Json(json!({
                        "streamSessions": [
                            {"id": 9, "status": "active", "startedAt": "2024-05-01T10:01:00",
                             "stream": {"id": 1}},
                            {"id": 8, "status": "STOPPED", "stream": {"id": 2}},
                            {"id": 7, "status": "PAUSED", "stream": {"id": 2}},
                            {"id": 6, "status": "ACTIVE"}
                        ]
                    }))
                }),
            )
            .route(
                "/api/stream-sessions/status-map",
                get(|| async { Json(json!({"statusMap": {"1": "ACTIVE", "3": "stopped"}})) }),
            )
            .route(
                "/api/stream-sessions/ffmpeg-stat/:key",
                get(|Path(key): Path<String>| async move {
                    if key == "live key" {
                        Json(json!({"streamKey": key, "stat": {"fps": 30.0, "bitrate": "2500kbits/s", "speed": "1.0x", "updatedAt": 5}}))
                    } else {
                        Json(json!({"streamKey": key, "stat": null}))
                    }
                }),
            )
            .route(
                "/api/stream-sessions/start/:id",
                post(|Path(id): Path<i64>| async move {
                    if id == 1 {
                        (
                            AxumStatus::BAD_REQUEST,
                            Json(json!({"message": "Stream is ACTIVE"})),
                        )
                            .into_response()
                    } else {
                        Json(json!({"streamSession": {"id": 50, "status": "ACTIVE"}}))
                            .into_response()
                    }
                }),
            )
            .route(
                "/api/streams/:id",
                axum::routing::delete(|Path(id): Path<i64>| async move {
                    if id == 404 {
                        AxumStatus::NOT_FOUND.into_response()
                    } else {
                        AxumStatus::UNAUTHORIZED.into_response()
                    }
                }),
            )
    }

    fn backend(base: String) -> BackendClient {
        BackendClient::new(&BackendConfig {
            base_url: base,
            request_timeout_secs: 5,
        })
        .unwrap()
    }

    fn who() -> Identity {
        Identity {
            user_id: Some(4),
            token: Some("t".into()),
        }
    }

    #[tokio::test]
    async fn decodes_stream_page() {
        let client = backend(serve(mock_backend()).await);
        let page = client
            .list_streams(&who(), &PollScope::default())
            .await
            .unwrap();
        assert_eq!(page.total, 12);
        assert_eq!(page.streams.len(), 2);
        let first = &page.streams[0];
        assert_eq!(first.stream_key, "k1");
        assert!(first.is_unbounded());
        assert_eq!(first.asset.as_deref(), Some("/srv/v/1.mp4"));
        assert!(page.streams[1].scheduled_start.is_none());
    }

    #[tokio::test]
    async fn session_list_skips_unusable_records_and_filters() {
        let client = backend(serve(mock_backend()).await);
        let all = client
            .list_sessions(&who(), &SessionFilter::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, SessionStatus::Active);

        let only_two = client
            .list_sessions(
                &who(),
                &SessionFilter {
                    status: None,
                    stream_ids: vec![StreamId(2)],
                },
            )
            .await
            .unwrap();
        assert_eq!(only_two.len(), 1);
        assert_eq!(only_two[0].id, SessionId(8));
    }

    #[tokio::test]
    async fn status_map_parses_keys() {
        let client = backend(serve(mock_backend()).await);
        let map = client
            .status_map(&who(), &[StreamId(1), StreamId(3)])
            .await
            .unwrap();
        assert_eq!(map[&StreamId(1)], SessionStatus::Active);
        assert_eq!(map[&StreamId(3)], SessionStatus::Stopped);
    }

    #[tokio::test]
    async fn telemetry_absence_is_not_an_error() {
        let client = backend(serve(mock_backend()).await);
        let live = client.sample(&who(), "live key").await.unwrap().unwrap();
        assert_eq!(live.fps, Some(30.0));
        assert_eq!(live.updated_at, Some(5));
        assert!(client.sample(&who(), "idle").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn statuses_map_onto_taxonomy() {
        let client = backend(serve(mock_backend()).await);
        let err = client.start_session(&who(), StreamId(1)).await.unwrap_err();
        assert_eq!(
            err,
            Error::Rejected {
                status: 400,
                message: "Stream is ACTIVE".into()
            }
        );

        let started = client.start_session(&who(), StreamId(2)).await.unwrap();
        assert_eq!(started.stream_id, StreamId(2));

        assert!(client
            .delete_stream(&who(), StreamId(404))
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(
            client.delete_stream(&who(), StreamId(5)).await.unwrap_err(),
            Error::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn acquisition_ack_and_rejection() {
        let app = Router::new()
            .route(
                "/list_files",
                get(|headers: axum::http::HeaderMap| async move {
                    let auth: Vec<&str> = headers
                        .get_all("authorization")
                        .iter()
                        .filter_map(|v| v.to_str().ok())
                        .collect();
                    assert_eq!(auth, vec!["secret"]);
                    Json(json!({"files": [{"fileName": "1.mp4"}, {"fileName": "notes.txt"}]}))
                }),
            )
            .route(
                "/download",
                post(|Json(body): Json<serde_json::Value>| async move {
                    if body["file_name"] == "bad.mp4" {
                        (
                            AxumStatus::BAD_REQUEST,
                            Json(json!({"error": "quota exceeded"})),
                        )
                            .into_response()
                    } else {
                        assert_eq!(body["file_type"], "drive");
                        Json(json!({"message": "queued"})).into_response()
                    }
                }),
            );
        let base = serve(app).await.trim_end_matches("/api").to_string();
        let client = AcquisitionClient::new(
            &AcquisitionConfig {
                base_url: base,
                auth_token: Some("secret".into()),
                ..Default::default()
            },
            std::time::Duration::from_secs(5),
        )
        .unwrap();

        assert_eq!(
            client.list_files(&who()).await.unwrap(),
            vec!["1.mp4".to_string(), "notes.txt".to_string()]
        );

        let ok = client
            .submit(&who(), "https://drive.google.com/file/d/x/view", "2.mp4")
            .await
            .unwrap();
        assert!(ok.accepted);
        assert_eq!(ok.message, "queued");

        let rejected = client
            .submit(&who(), "https://drive.google.com/file/d/x/view", "bad.mp4")
            .await
            .unwrap();
        assert!(!rejected.accepted);
        assert_eq!(rejected.message, "quota exceeded");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let base = Url::parse("http://h/api/").unwrap();
        let url = endpoint(&base, &["stream-sessions", "ffmpeg-stat", "a b/c"]);
        assert_eq!(url.as_str(), "http://h/api/stream-sessions/ffmpeg-stat/a%20b%2Fc");
    }
}
