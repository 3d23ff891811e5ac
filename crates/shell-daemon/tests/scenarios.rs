use std::time::Duration;

use serial_test::serial;
use shell_daemon::daemon::Daemon;
use shelld_config::Settings;
use shelld_control::{client, ControlRequest};

async fn build_daemon() -> (std::sync::Arc<Daemon>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let socket_path = dir.path().join("daemon.sock");
    unsafe {
        std::env::set_var("MCP_SHELL_OUTPUT_DIR", dir.path().join("outputs"));
    }
    let settings = Settings::load(dir.path().to_path_buf(), Some("test"), Some(socket_path)).unwrap();
    unsafe {
        std::env::remove_var("MCP_SHELL_OUTPUT_DIR");
    }
    let daemon = Daemon::new(settings).await.unwrap();
    daemon.spawn_background_tasks();
    (daemon, dir)
}

/// A submitted command runs to completion, its stdout/stderr land in the
/// file sink, and the replay buffer carries the same bytes.
#[tokio::test]
#[serial]
async fn execution_fans_out_to_sink_and_replay() {
    let (daemon, _dir) = build_daemon().await;
    let http_addr = daemon.serve_http().await.unwrap();

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{http_addr}/v1/exec"))
        .json(&serde_json::json!({"command": "echo hello-from-daemon"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let started: serde_json::Value = resp.json().await.unwrap();
    let execution_id = started["execution_id"].as_str().unwrap().to_string();

    let mut record = serde_json::Value::Null;
    for _ in 0..50 {
        let resp = client
            .get(format!("http://{http_addr}/v1/exec/{execution_id}"))
            .send()
            .await
            .unwrap();
        record = resp.json().await.unwrap();
        if record["status"] == "completed" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(record["status"], "completed");
    assert!(record["stdout"].as_str().unwrap().contains("hello-from-daemon"));

    let exec_id = shelld_core::ids::ExecutionId::from_str_id(execution_id);
    let latest = daemon.replay.get_latest_buffers(&exec_id, 10);
    assert!(!latest.is_empty());
    let replayed: Vec<u8> = latest.iter().flat_map(|e| e.bytes.clone()).collect();
    assert!(String::from_utf8_lossy(&replayed).contains("hello-from-daemon"));
}

/// The control channel reports the daemon's live counts and accepts stop.
#[tokio::test]
#[serial]
async fn control_channel_status_and_stop() {
    let (daemon, _dir) = build_daemon().await;
    let socket_path = daemon.settings.socket_path.clone();
    let shutdown = daemon.shutdown_token();

    let serve_handle = tokio::spawn({
        let daemon = daemon.clone();
        async move {
            daemon.serve_control().await.unwrap();
        }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = client::send(&socket_path, ControlRequest::Status).await.unwrap();
    assert!(response.ok);
    assert!(response.data.unwrap().get("execution_count").is_some());

    let response = client::send(&socket_path, ControlRequest::Stop).await.unwrap();
    assert!(response.ok);
    assert!(shutdown.is_cancelled());

    serve_handle.await.unwrap();
}

/// Creating and closing a terminal session through the daemon's primary-
/// terminal control surface round-trips cleanly.
#[tokio::test]
#[serial]
async fn attach_creates_a_primary_terminal() {
    let (daemon, _dir) = build_daemon().await;
    let handler: &dyn shelld_control::ControlHandler = daemon.as_ref();
    handler.attach(None).await.unwrap();
    let info = handler.status().await;
    assert_eq!(info["terminal_count"], 1);
}
