//! One-shot client for sending a single control-channel request and reading
//! its single response line, used by the CLI surface.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::protocol::{ControlRequest, ControlResponse};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(1);

pub async fn send(socket_path: &Path, request: ControlRequest) -> Result<ControlResponse> {
    tokio::time::timeout(CLIENT_TIMEOUT, send_inner(socket_path, request))
        .await
        .context("control request timed out")?
}

async fn send_inner(socket_path: &Path, request: ControlRequest) -> Result<ControlResponse> {
    let mut stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("failed to connect to {}", socket_path.display()))?;

    let mut payload = serde_json::to_vec(&serializable(&request))?;
    payload.push(b'\n');
    stream.write_all(&payload).await.context("failed to send request")?;

    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .await
        .context("failed to read response")?;

    serde_json::from_str(line.trim()).context("malformed response")
}

fn serializable(request: &ControlRequest) -> serde_json::Value {
    match request {
        ControlRequest::Status => serde_json::json!({"verb": "status"}),
        ControlRequest::Info => serde_json::json!({"verb": "info"}),
        ControlRequest::Attach { session_id } => serde_json::json!({"verb": "attach", "session_id": session_id}),
        ControlRequest::Reattach { session_id } => {
            serde_json::json!({"verb": "reattach", "session_id": session_id})
        }
        ControlRequest::Detach => serde_json::json!({"verb": "detach"}),
        ControlRequest::Stop => serde_json::json!({"verb": "stop"}),
    }
}
