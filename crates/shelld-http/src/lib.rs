//! Local-only HTTP surface for one-shot command execution: submit, poll,
//! stream, and kill, bound to loopback and capped at a small request body.

pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

pub use state::{AppState, ExecutionPrep, NullExecutionPrep};

const MAX_BODY_BYTES: usize = 64 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/v1/exec", post(routes::submit_exec))
        .route("/v1/exec/{id}", get(routes::get_exec))
        .route("/v1/exec/{id}/outputs", get(routes::get_outputs))
        .route("/v1/exec/{id}/sse", get(routes::stream_exec))
        .route("/v1/exec/{id}/kill", post(routes::kill_exec))
        .layer(axum::middleware::from_fn(middleware::require_loopback))
        .layer(axum::middleware::from_fn(middleware::trace_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelld_process::ProcessSupervisor;
    use state::NullExecutionPrep;
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::net::TcpListener;

    async fn spawn_test_server() -> (SocketAddr, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let process = ProcessSupervisor::new(dir.path().to_path_buf());
        let state = Arc::new(AppState {
            process,
            prep: Arc::new(NullExecutionPrep),
            started_at: Instant::now(),
            version: "test",
        });
        let router = build_router(state.clone())
            .into_make_service_with_connect_info::<SocketAddr>();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        (addr, state)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (addr, _state) = spawn_test_server().await;
        let resp = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn submit_and_fetch_execution() {
        let (addr, _state) = spawn_test_server().await;
        let client = reqwest::Client::new();
        let resp = client
            .post(format!("http://{addr}/v1/exec"))
            .json(&serde_json::json!({"command": "echo hi"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let started: serde_json::Value = resp.json().await.unwrap();
        let execution_id = started["execution_id"].as_str().unwrap().to_string();

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let resp = client
            .get(format!("http://{addr}/v1/exec/{execution_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let record: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(record["status"], "completed");
    }

    #[tokio::test]
    async fn unknown_execution_is_not_found() {
        let (addr, _state) = spawn_test_server().await;
        let resp = reqwest::get(format!("http://{addr}/v1/exec/does-not-exist"))
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
