//! Route handlers for the local executor surface: submit a command, poll
//! its record, stream its progress, fetch captured output, or kill it.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{http::StatusCode, Json};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use shelld_core::ids::ExecutionId;
use shelld_core::types::{ExecutionRecord, SignalKind};
use shelld_core::ShelldError;
use shelld_process::StartRequest;

use crate::state::AppState;

const SSE_POLL_INTERVAL: Duration = Duration::from_millis(200);
const SSE_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

pub struct ApiError(ShelldError);

impl From<ShelldError> for ApiError {
    fn from(e: ShelldError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            ShelldError::NotFound { .. } => StatusCode::NOT_FOUND,
            ShelldError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ShelldError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ShelldError::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            ShelldError::ResourceLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            ShelldError::ExecutionFailure { .. } | ShelldError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({
            "error": self.0.kind_tag(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: state.version,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

#[derive(Deserialize)]
pub struct ExecBody {
    pub command: String,
    pub cwd: Option<std::path::PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub capture_stderr: Option<bool>,
    pub max_output_size: Option<usize>,
    pub input_data: Option<String>,
    pub safety_evaluation: Option<serde_json::Value>,
    pub execution_id: Option<String>,
}

pub async fn submit_exec(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExecBody>,
) -> Result<Json<shelld_process::StartResponse>, ApiError> {
    let execution_id = match body.execution_id {
        Some(id) if !id.is_empty() => ExecutionId::from_str_id(id),
        _ => ExecutionId::generate(),
    };
    state.prep.prepare(&execution_id).await;

    let req = StartRequest {
        command: body.command,
        cwd: body.cwd,
        timeout_seconds: body.timeout_seconds,
        capture_stderr: body.capture_stderr,
        max_output_size: body.max_output_size,
        input_data: body.input_data.map(|s| s.into_bytes()),
        safety_evaluation: body.safety_evaluation,
        execution_id: Some(execution_id.to_string()),
    };
    let response = state.process.start(req).await?;
    Ok(Json(response))
}

pub async fn get_exec(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionRecord>, ApiError> {
    let execution_id = ExecutionId::from_str_id(id);
    let record = state.process.get_record(&execution_id).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct OutputsResponse {
    stdout: String,
    stderr: String,
}

pub async fn get_outputs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OutputsResponse>, ApiError> {
    let execution_id = ExecutionId::from_str_id(id);
    let (stdout, stderr) = state.process.get_outputs(&execution_id).await?;
    Ok(Json(OutputsResponse {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    }))
}

#[derive(Deserialize, Default)]
pub struct KillBody {
    pub signal: Option<SignalKind>,
    pub force: Option<bool>,
}

pub async fn kill_exec(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<KillBody>,
) -> Result<Json<shelld_process::KillOutcome>, ApiError> {
    let execution_id = ExecutionId::from_str_id(id);
    let outcome = state
        .process
        .kill(&execution_id, body.signal.unwrap_or_default(), body.force.unwrap_or(false))
        .await?;
    Ok(Json(outcome))
}

/// Snapshot the record on connect, then an `update` event each time it
/// changes, an `end` event once it reaches a terminal status, and a
/// `heartbeat` comment every 10s to keep idle proxies from closing the
/// connection. Polling (rather than subscribing to the publisher fabric)
/// keeps this crate's only daemon dependency on the process supervisor.
pub async fn stream_exec(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let execution_id = ExecutionId::from_str_id(id);
    // Fail fast if the execution is unknown rather than opening a stream
    // that would emit nothing but heartbeats forever.
    state.process.get_record(&execution_id).await?;

    let process = state.process.clone();
    let initial = SseState {
        last_updated_at: None,
        last_heartbeat: Instant::now(),
        ended: false,
    };

    let stream = stream::unfold(
        (process, execution_id, initial),
        |(process, execution_id, mut cursor)| async move {
            if cursor.ended {
                return None;
            }
            loop {
                tokio::time::sleep(SSE_POLL_INTERVAL).await;
                let Ok(record) = process.get_record(&execution_id).await else {
                    cursor.ended = true;
                    let event = Event::default().event("end").data("execution record removed");
                    return Some((Ok(event), (process, execution_id, cursor)));
                };

                if cursor.last_updated_at != Some(record.updated_at) {
                    cursor.last_updated_at = Some(record.updated_at);
                    cursor.last_heartbeat = Instant::now();
                    let terminal = record.status.is_terminal();
                    let payload = serde_json::to_string(&record).unwrap_or_default();
                    let event = Event::default()
                        .event(if terminal { "end" } else { "update" })
                        .data(payload);
                    cursor.ended = terminal;
                    return Some((Ok(event), (process, execution_id, cursor)));
                }

                if cursor.last_heartbeat.elapsed() >= SSE_HEARTBEAT_INTERVAL {
                    cursor.last_heartbeat = Instant::now();
                    let event = Event::default().comment("heartbeat");
                    return Some((Ok(event), (process, execution_id, cursor)));
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

struct SseState {
    last_updated_at: Option<chrono::DateTime<chrono::Utc>>,
    last_heartbeat: Instant,
    ended: bool,
}
