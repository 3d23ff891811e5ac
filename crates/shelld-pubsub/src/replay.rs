//! Replay Buffer Subscriber (C3): a bounded, sequence-numbered backlog per
//! execution so a reconnecting reader can catch up without re-running.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shelld_core::ids::ExecutionId;

use crate::subscriber::Subscriber;

const DEFAULT_MAX_BUFFERS: usize = 1_000;
const DEFAULT_RETENTION_SECONDS: i64 = 3_600;
const SWEEP_INTERVAL_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct BufferEntry {
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub bytes: Vec<u8>,
    pub is_stderr: bool,
}

#[derive(Debug, Clone)]
pub struct StreamState {
    pub is_active: bool,
    pub last_update_time: DateTime<Utc>,
    pub total_bytes_received: u64,
    pub sequence_counter: u64,
}

struct Stream {
    entries: Vec<BufferEntry>,
    state: StreamState,
}

pub struct ReplayBufferSubscriber {
    max_buffers: usize,
    max_retention_seconds: i64,
    streams: RwLock<HashMap<ExecutionId, Stream>>,
}

impl ReplayBufferSubscriber {
    pub fn new() -> Arc<Self> {
        Self::with_limits(DEFAULT_MAX_BUFFERS, DEFAULT_RETENTION_SECONDS)
    }

    pub fn with_limits(max_buffers: usize, max_retention_seconds: i64) -> Arc<Self> {
        Arc::new(Self {
            max_buffers,
            max_retention_seconds,
            streams: RwLock::new(HashMap::new()),
        })
    }

    /// Spawn the background sweeper; cancel by dropping the returned handle.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECONDS));
            loop {
                ticker.tick().await;
                this.sweep();
            }
        })
    }

    fn sweep(&self) {
        let mut streams = self.streams.write().unwrap();
        streams.retain(|_, stream| {
            let age = Utc::now().signed_duration_since(stream.state.last_update_time);
            age.num_seconds() < self.max_retention_seconds
        });
    }

    pub fn get_latest_buffers(&self, execution_id: &ExecutionId, n: usize) -> Vec<BufferEntry> {
        let streams = self.streams.read().unwrap();
        match streams.get(execution_id) {
            Some(stream) => {
                let len = stream.entries.len();
                let start = len.saturating_sub(n);
                stream.entries[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    pub fn get_buffers_from_sequence(
        &self,
        execution_id: &ExecutionId,
        from: u64,
        max: usize,
    ) -> Vec<BufferEntry> {
        let streams = self.streams.read().unwrap();
        match streams.get(execution_id) {
            Some(stream) => stream
                .entries
                .iter()
                .filter(|e| e.sequence_number >= from)
                .take(max)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn get_stream_state(&self, execution_id: &ExecutionId) -> Option<StreamState> {
        self.streams.read().unwrap().get(execution_id).map(|s| s.state.clone())
    }

    fn push(&self, execution_id: &ExecutionId, bytes: Vec<u8>, is_stderr: bool) {
        let mut streams = self.streams.write().unwrap();
        let stream = streams.entry(execution_id.clone()).or_insert_with(|| Stream {
            entries: Vec::new(),
            state: StreamState {
                is_active: true,
                last_update_time: Utc::now(),
                total_bytes_received: 0,
                sequence_counter: 0,
            },
        });
        let seq = stream.state.sequence_counter;
        stream.state.sequence_counter += 1;
        stream.state.total_bytes_received += bytes.len() as u64;
        let now = Utc::now();
        stream.state.last_update_time = now;
        stream.entries.push(BufferEntry {
            sequence_number: seq,
            timestamp: now,
            bytes,
            is_stderr,
        });
        if stream.entries.len() > self.max_buffers {
            let overflow = stream.entries.len() - self.max_buffers;
            stream.entries.drain(..overflow);
        }
    }
}

#[async_trait]
impl Subscriber for ReplayBufferSubscriber {
    async fn on_start(&self, execution_id: &ExecutionId) {
        let mut streams = self.streams.write().unwrap();
        streams.entry(execution_id.clone()).or_insert_with(|| Stream {
            entries: Vec::new(),
            state: StreamState {
                is_active: true,
                last_update_time: Utc::now(),
                total_bytes_received: 0,
                sequence_counter: 0,
            },
        });
    }

    async fn on_data(&self, execution_id: &ExecutionId, bytes: &[u8], is_stderr: bool) {
        self.push(execution_id, bytes.to_vec(), is_stderr);
    }

    async fn on_end(&self, execution_id: &ExecutionId, _exit_code: Option<i32>) {
        if let Some(stream) = self.streams.write().unwrap().get_mut(execution_id) {
            stream.state.is_active = false;
            stream.state.last_update_time = Utc::now();
        }
    }

    async fn on_error(&self, execution_id: &ExecutionId, _message: &str) {
        if let Some(stream) = self.streams.write().unwrap().get_mut(execution_id) {
            stream.state.is_active = false;
            stream.state.last_update_time = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_increase_strictly() {
        let buf = ReplayBufferSubscriber::new();
        let id = ExecutionId::generate();
        buf.on_start(&id).await;
        buf.on_data(&id, b"a", false).await;
        buf.on_data(&id, b"b", false).await;
        let latest = buf.get_latest_buffers(&id, 10);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].sequence_number, 0);
        assert_eq!(latest[1].sequence_number, 1);
    }

    #[tokio::test]
    async fn overflow_drops_from_head() {
        let buf = ReplayBufferSubscriber::with_limits(3, DEFAULT_RETENTION_SECONDS);
        let id = ExecutionId::generate();
        buf.on_start(&id).await;
        for i in 0..5u8 {
            buf.on_data(&id, &[i], false).await;
        }
        let latest = buf.get_latest_buffers(&id, 10);
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].sequence_number, 2);
        assert_eq!(latest[2].sequence_number, 4);
    }

    #[tokio::test]
    async fn get_buffers_from_sequence_filters_and_caps() {
        let buf = ReplayBufferSubscriber::new();
        let id = ExecutionId::generate();
        buf.on_start(&id).await;
        for i in 0..5u8 {
            buf.on_data(&id, &[i], false).await;
        }
        let page = buf.get_buffers_from_sequence(&id, 3, 1);
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].sequence_number, 3);
    }

    #[tokio::test]
    async fn on_end_marks_stream_inactive() {
        let buf = ReplayBufferSubscriber::new();
        let id = ExecutionId::generate();
        buf.on_start(&id).await;
        buf.on_end(&id, Some(0)).await;
        assert!(!buf.get_stream_state(&id).unwrap().is_active);
    }
}
