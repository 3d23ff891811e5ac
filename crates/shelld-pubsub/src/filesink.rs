//! File Sink Subscriber (C2): persists stdout/stderr to disk as the
//! execution runs, so other processes can tail them before it finishes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use shelld_core::ids::ExecutionId;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use crate::registry::{FileRegistry, OutputKind};
use crate::subscriber::Subscriber;

struct OpenFiles {
    stdout: File,
    stderr: File,
}

pub struct FileSinkSubscriber {
    base_dir: PathBuf,
    registry: Arc<dyn FileRegistry>,
    open: Mutex<HashMap<ExecutionId, OpenFiles>>,
}

impl FileSinkSubscriber {
    pub fn new(base_dir: PathBuf, registry: Arc<dyn FileRegistry>) -> Arc<Self> {
        Arc::new(Self {
            base_dir,
            registry,
            open: Mutex::new(HashMap::new()),
        })
    }

    async fn close_handles(&self, execution_id: &ExecutionId, trailing_error: Option<&str>) {
        let mut open = self.open.lock().await;
        let Some(mut files) = open.remove(execution_id) else {
            return; // already closed; idempotent
        };
        if let Some(message) = trailing_error {
            let line = format!("[ERROR] {message}\n");
            if let Err(e) = files.stderr.write_all(line.as_bytes()).await {
                warn!(execution_id = %execution_id, error = %e, "failed writing trailing error line");
            }
        }
        let _ = files.stdout.flush().await;
        let _ = files.stderr.flush().await;
    }
}

#[async_trait]
impl Subscriber for FileSinkSubscriber {
    async fn on_start(&self, execution_id: &ExecutionId) {
        if let Err(e) = tokio::fs::create_dir_all(&self.base_dir).await {
            warn!(execution_id = %execution_id, error = %e, "failed to create sink base dir");
            return;
        }
        let ts = Utc::now().timestamp_millis();
        let stdout_path = self.base_dir.join(format!("{execution_id}-stdout-{ts}.txt"));
        let stderr_path = self.base_dir.join(format!("{execution_id}-stderr-{ts}.txt"));

        let (stdout, stderr) = match (
            File::create(&stdout_path).await,
            File::create(&stderr_path).await,
        ) {
            (Ok(o), Ok(e)) => (o, e),
            _ => {
                warn!(execution_id = %execution_id, "failed to create sink files");
                return;
            }
        };

        self.registry
            .register(execution_id, OutputKind::Stdout, stdout_path);
        self.registry
            .register(execution_id, OutputKind::Stderr, stderr_path);

        self.open
            .lock()
            .await
            .insert(execution_id.clone(), OpenFiles { stdout, stderr });
    }

    async fn on_data(&self, execution_id: &ExecutionId, bytes: &[u8], is_stderr: bool) {
        let mut open = self.open.lock().await;
        let Some(files) = open.get_mut(execution_id) else {
            return;
        };
        let file = if is_stderr {
            &mut files.stderr
        } else {
            &mut files.stdout
        };
        if let Err(e) = file.write_all(bytes).await {
            warn!(execution_id = %execution_id, error = %e, "sink write failed");
            return;
        }
        // Durability flush so concurrent readers in other processes can tail.
        if let Err(e) = file.sync_data().await {
            warn!(execution_id = %execution_id, error = %e, "sink flush failed");
        }
    }

    async fn on_end(&self, execution_id: &ExecutionId, _exit_code: Option<i32>) {
        self.close_handles(execution_id, None).await;
    }

    async fn on_error(&self, execution_id: &ExecutionId, message: &str) {
        self.close_handles(execution_id, Some(message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryFileRegistry;

    #[tokio::test]
    async fn writes_and_registers_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryFileRegistry::new());
        let sink = FileSinkSubscriber::new(dir.path().to_path_buf(), registry.clone());
        let id = ExecutionId::generate();

        sink.on_start(&id).await;
        sink.on_data(&id, b"out\n", false).await;
        sink.on_data(&id, b"err\n", true).await;
        sink.on_end(&id, Some(0)).await;

        let stdout_path = registry.lookup(&id, OutputKind::Stdout).unwrap();
        let stderr_path = registry.lookup(&id, OutputKind::Stderr).unwrap();
        assert_eq!(tokio::fs::read_to_string(stdout_path).await.unwrap(), "out\n");
        assert_eq!(tokio::fs::read_to_string(stderr_path).await.unwrap(), "err\n");
    }

    #[tokio::test]
    async fn error_appends_trailing_line_and_late_end_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(InMemoryFileRegistry::new());
        let sink = FileSinkSubscriber::new(dir.path().to_path_buf(), registry.clone());
        let id = ExecutionId::generate();

        sink.on_start(&id).await;
        sink.on_error(&id, "boom").await;
        sink.on_end(&id, None).await; // late end after error: no-op

        let stderr_path = registry.lookup(&id, OutputKind::Stderr).unwrap();
        let contents = tokio::fs::read_to_string(stderr_path).await.unwrap();
        assert!(contents.contains("[ERROR] boom"));
    }
}
