//! Pipeline Reader (C4): a lazy byte stream over an execution's output that
//! starts by tailing the on-disk sink file and falls over to the replay
//! buffer once the file stops growing but the producer is still live.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use shelld_core::ids::ExecutionId;
use shelld_core::{Result, ShelldError};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::registry::{FileRegistry, OutputKind};
use crate::replay::ReplayBufferSubscriber;

const READ_BLOCK_SIZE: usize = 64 * 1024;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_NO_PROGRESS_TIMEOUT_SECS: u64 = 30;
const STREAM_BATCH_SIZE: usize = 64;

enum Phase {
    File { file: Option<File>, position: u64 },
    Stream { last_file_sequence: u64 },
}

enum ChunkOutcome {
    Data(Vec<u8>),
    Empty,
    Eof,
}

pub struct PipelineReader {
    execution_id: ExecutionId,
    kind: OutputKind,
    registry: Arc<dyn FileRegistry>,
    replay: Arc<ReplayBufferSubscriber>,
    phase: Phase,
    poll_interval: Duration,
    no_progress_timeout: Duration,
}

impl PipelineReader {
    pub fn new(
        execution_id: ExecutionId,
        kind: OutputKind,
        registry: Arc<dyn FileRegistry>,
        replay: Arc<ReplayBufferSubscriber>,
    ) -> Self {
        Self {
            execution_id,
            kind,
            registry,
            replay,
            phase: Phase::File {
                file: None,
                position: 0,
            },
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            no_progress_timeout: Duration::from_secs(DEFAULT_NO_PROGRESS_TIMEOUT_SECS),
        }
    }

    fn producer_terminal(&self) -> bool {
        self.replay
            .get_stream_state(&self.execution_id)
            .map(|s| !s.is_active)
            .unwrap_or(true)
    }

    /// Next non-empty chunk, `None` on EOF, `Err(Timeout)` after 30s with no
    /// progress (file growth or new buffers) while the producer is live.
    pub async fn read_next(&mut self) -> Result<Option<Vec<u8>>> {
        let waiting_since = Instant::now();
        loop {
            match self.step().await? {
                ChunkOutcome::Data(bytes) => return Ok(Some(bytes)),
                ChunkOutcome::Eof => return Ok(None),
                ChunkOutcome::Empty => {
                    if waiting_since.elapsed() >= self.no_progress_timeout {
                        return Err(ShelldError::Timeout {
                            elapsed_ms: waiting_since.elapsed().as_millis() as u64,
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn step(&mut self) -> Result<ChunkOutcome> {
        match &mut self.phase {
            Phase::File { file, position } => {
                if file.is_none() {
                    let Some(path) = self.registry.lookup(&self.execution_id, self.kind) else {
                        return Ok(if self.producer_terminal() {
                            ChunkOutcome::Eof
                        } else {
                            ChunkOutcome::Empty
                        });
                    };
                    *file = Some(open_file(&path).await?);
                }
                let handle = file.as_mut().expect("file just populated");
                handle
                    .seek(std::io::SeekFrom::Start(*position))
                    .await
                    .map_err(|e| ShelldError::Internal(anyhow::anyhow!("seek failed: {e}")))?;
                let mut buf = vec![0u8; READ_BLOCK_SIZE];
                let n = handle
                    .read(&mut buf)
                    .await
                    .map_err(|e| ShelldError::Internal(anyhow::anyhow!("read failed: {e}")))?;
                if n > 0 {
                    buf.truncate(n);
                    *position += n as u64;
                    return Ok(ChunkOutcome::Data(buf));
                }
                if self.producer_terminal() {
                    return Ok(ChunkOutcome::Eof);
                }
                let last_file_sequence = self
                    .replay
                    .get_stream_state(&self.execution_id)
                    .map(|s| s.sequence_counter)
                    .unwrap_or(0);
                self.phase = Phase::Stream { last_file_sequence };
                Ok(ChunkOutcome::Empty)
            }
            Phase::Stream { last_file_sequence } => {
                let entries = self.replay.get_buffers_from_sequence(
                    &self.execution_id,
                    *last_file_sequence + 1,
                    STREAM_BATCH_SIZE,
                );
                if let Some(max_seq) = entries.iter().map(|e| e.sequence_number).max() {
                    *last_file_sequence = max_seq;
                }
                let wants_stderr = matches!(self.kind, OutputKind::Stderr);
                if let Some(entry) = entries.into_iter().find(|e| e.is_stderr == wants_stderr) {
                    return Ok(ChunkOutcome::Data(entry.bytes));
                }
                if self.producer_terminal() {
                    return Ok(ChunkOutcome::Eof);
                }
                Ok(ChunkOutcome::Empty)
            }
        }
    }
}

async fn open_file(path: &PathBuf) -> Result<File> {
    File::open(path)
        .await
        .map_err(|e| ShelldError::Internal(anyhow::anyhow!("failed to open {}: {e}", path.display())))
}
