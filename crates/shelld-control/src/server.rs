//! Accept loop for the control channel: one request, one response, then the
//! connection closes. Each request is bounded by a 1000ms deadline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::protocol::{ControlRequest, ControlResponse};
use crate::socket::{bind_listener, bind_systemd_activated_listener, cleanup_socket_file};

const REQUEST_DEADLINE: Duration = Duration::from_millis(1_000);

#[async_trait]
pub trait ControlHandler: Send + Sync {
    async fn status(&self) -> serde_json::Value;
    async fn info(&self) -> serde_json::Value;
    async fn attach(&self, session_id: Option<String>) -> Result<(), String>;
    async fn reattach(&self, session_id: Option<String>) -> Result<(), String>;
    async fn detach(&self) -> Result<(), String>;
    async fn stop(&self) -> Result<(), String>;
}

pub async fn run(
    socket_path: &Path,
    handler: Arc<dyn ControlHandler>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = match bind_systemd_activated_listener()? {
        Some(listener) => listener,
        None => bind_listener(socket_path).await?,
    };

    let result = accept_loop(listener, handler, shutdown).await;
    let _ = cleanup_socket_file(socket_path).await;
    result
}

async fn accept_loop(
    listener: UnixListener,
    handler: Arc<dyn ControlHandler>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("control channel shutting down");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = tokio::time::timeout(REQUEST_DEADLINE, serve_one(stream, handler)).await {
                        warn!(error = %e, "control request exceeded deadline");
                    }
                });
            }
        }
    }
}

async fn serve_one(stream: UnixStream, handler: Arc<dyn ControlHandler>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let response = match reader.read_line(&mut line).await {
        Ok(0) => return, // peer closed without sending a request
        Ok(_) => dispatch(&line, &handler).await,
        Err(e) => ControlResponse::err(format!("read failed: {e}")),
    };

    let Ok(mut payload) = serde_json::to_vec(&response) else {
        return;
    };
    payload.push(b'\n');
    let _ = write_half.write_all(&payload).await;
}

async fn dispatch(line: &str, handler: &Arc<dyn ControlHandler>) -> ControlResponse {
    let request: ControlRequest = match serde_json::from_str(line.trim()) {
        Ok(req) => req,
        Err(e) => return ControlResponse::err(format!("malformed request: {e}")),
    };

    match request {
        ControlRequest::Status => ControlResponse::ok(handler.status().await),
        ControlRequest::Info => ControlResponse::ok(handler.info().await),
        ControlRequest::Attach { session_id } => match handler.attach(session_id).await {
            Ok(()) => ControlResponse::ok_empty(),
            Err(e) => ControlResponse::err(e),
        },
        ControlRequest::Reattach { session_id } => match handler.reattach(session_id).await {
            Ok(()) => ControlResponse::ok_empty(),
            Err(e) => ControlResponse::err(e),
        },
        ControlRequest::Detach => match handler.detach().await {
            Ok(()) => ControlResponse::ok_empty(),
            Err(e) => ControlResponse::err(e),
        },
        ControlRequest::Stop => match handler.stop().await {
            Ok(()) => ControlResponse::ok_empty(),
            Err(e) => ControlResponse::err(e),
        },
    }
}
