//! Narrow append interface to the (out-of-scope) command-history / telemetry
//! store behind a narrow append interface, kept separate from the live record so

use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::types::ExecutionRecord;

/// Sink for terminal execution records. Implementations must not block the
/// supervisor's hot path for long; the default implementation does a single
/// buffered append-and-flush per call.
pub trait HistorySink: Send + Sync {
    fn record(&self, execution: &ExecutionRecord);
}

/// No-op sink, used when no telemetry collaborator is configured.
pub struct NullHistorySink;

impl HistorySink for NullHistorySink {
    fn record(&self, _execution: &ExecutionRecord) {}
}

/// Appends one JSON line per terminal execution to a file.
pub struct JsonlHistorySink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl JsonlHistorySink {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl HistorySink for JsonlHistorySink {
    fn record(&self, execution: &ExecutionRecord) {
        let Ok(line) = serde_json::to_string(execution) else {
            tracing::warn!(execution_id = %execution.execution_id, "failed to serialize execution for history sink");
            return;
        };
        let Ok(mut file) = self.file.lock() else {
            return;
        };
        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(error = %e, "failed to append to history sink");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ExecutionId;

    #[test]
    fn jsonl_sink_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let sink = JsonlHistorySink::open(path.clone()).unwrap();

        let rec_a = ExecutionRecord::new(ExecutionId::from_str_id("a"), "echo a".into(), 1024);
        let rec_b = ExecutionRecord::new(ExecutionId::from_str_id("b"), "echo b".into(), 1024);
        sink.record(&rec_a);
        sink.record(&rec_b);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.contains("\"a\""));
        assert!(contents.contains("\"b\""));
    }

    #[test]
    fn null_sink_does_nothing() {
        let rec = ExecutionRecord::new(ExecutionId::from_str_id("x"), "echo".into(), 1024);
        NullHistorySink.record(&rec); // should not panic
    }
}
