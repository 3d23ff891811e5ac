//! Shared data model: Execution Record, Terminal Session, and the small
//! value types both subsystems and the transports hang off of.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ExecutionId, TerminalId};

/// Default cap on captured stdout/stderr per execution (5 MiB).
pub const DEFAULT_MAX_OUTPUT_SIZE: usize = 5 * 1024 * 1024;
/// Floor below which `max_output_size` is clamped up (1 KiB).
pub const MIN_MAX_OUTPUT_SIZE: usize = 1024;
/// Default wall-clock timeout for one-shot executions.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
/// Floor below which `timeout_seconds` is clamped up.
pub const MIN_TIMEOUT_SECONDS: u64 = 1;
/// Grace period between SIGTERM and SIGKILL during escalation.
pub const KILL_ESCALATION_GRACE_MS: u64 = 1_000;

/// Lifecycle status of a one-shot execution.
///
/// Transitions only move forward along `running -> {completed, failed}`;
/// `accepted` and `queued` exist for callers that enqueue before spawn but
/// this daemon spawns synchronously on accept, so in practice a record is
/// created directly in `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Accepted,
    Queued,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A single accepted command and its lifecycle record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub command: String,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(with = "serde_bytes_as_string")]
    pub stdout: Vec<u8>,
    #[serde(with = "serde_bytes_as_string")]
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    pub execution_time_ms: Option<u64>,
    pub safety_evaluation: Option<serde_json::Value>,
    pub max_output_size: usize,
}

impl ExecutionRecord {
    pub fn new(execution_id: ExecutionId, command: String, max_output_size: usize) -> Self {
        let now = Utc::now();
        Self {
            execution_id,
            command,
            status: ExecutionStatus::Running,
            created_at: now,
            updated_at: now,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_code: None,
            execution_time_ms: None,
            safety_evaluation: None,
            max_output_size: max_output_size.max(MIN_MAX_OUTPUT_SIZE),
        }
    }

    /// Append a stdout/stderr chunk, truncating so the buffer never exceeds
    /// `max_output_size`. Excess bytes are silently dropped.
    pub fn append_output(&mut self, bytes: &[u8], is_stderr: bool) {
        let buf = if is_stderr {
            &mut self.stderr
        } else {
            &mut self.stdout
        };
        let remaining = self.max_output_size.saturating_sub(buf.len());
        if remaining == 0 {
            self.touch();
            return;
        }
        let take = remaining.min(bytes.len());
        buf.extend_from_slice(&bytes[..take]);
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Transition to a terminal state. No-op (besides a touch) once already
    /// terminal, since transitions only move forward.
    pub fn finish(&mut self, exit_code: Option<i32>, execution_time_ms: u64) {
        if self.status.is_terminal() {
            return;
        }
        self.status = match exit_code {
            Some(0) => ExecutionStatus::Completed,
            _ => ExecutionStatus::Failed,
        };
        self.exit_code = exit_code;
        self.execution_time_ms = Some(execution_time_ms);
        self.touch();
    }
}

mod serde_bytes_as_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&String::from_utf8_lossy(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        Ok(s.into_bytes())
    }
}

/// Recognized interactive shells for a Terminal Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    Cmd,
    Powershell,
}

impl ShellType {
    pub fn program(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::Cmd => "cmd.exe",
            Self::Powershell => "powershell.exe",
        }
    }
}

/// PTY dimensions, bounded 1..500 cols x 1..200 rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    pub const MIN_COLS: u16 = 1;
    pub const MAX_COLS: u16 = 500;
    pub const MIN_ROWS: u16 = 1;
    pub const MAX_ROWS: u16 = 200;

    pub fn clamped(cols: u16, rows: u16) -> Self {
        Self {
            cols: cols.clamp(Self::MIN_COLS, Self::MAX_COLS),
            rows: rows.clamp(Self::MIN_ROWS, Self::MAX_ROWS),
        }
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Lifecycle status of a Terminal Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    Active,
    Idle,
    Closed,
}

/// Best-effort description of the PTY's current foreground process
/// cached per terminal for up to 5s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForegroundProcess {
    pub pid: i32,
    pub name: String,
    pub exe: Option<String>,
    pub is_session_leader: bool,
}

/// Signal accepted by the kill / sendInput control surfaces. Restricting to
/// a closed set (rather than an arbitrary integer) rejects malformed
/// requests at the deserialization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Sigterm,
    Sigkill,
    Sigint,
    Sighup,
}

impl SignalKind {
    #[cfg(unix)]
    pub fn as_libc(self) -> libc::c_int {
        match self {
            Self::Sigterm => libc::SIGTERM,
            Self::Sigkill => libc::SIGKILL,
            Self::Sigint => libc::SIGINT,
            Self::Sighup => libc::SIGHUP,
        }
    }
}

impl Default for SignalKind {
    fn default() -> Self {
        Self::Sigterm
    }
}

/// Daemon-wide metadata returned by the control channel's `info` verb.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonInfo {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub pid: u32,
    pub workspace_cwd: String,
    pub branch: String,
    pub execution_count: usize,
    pub terminal_count: usize,
    pub monitor_count: usize,
}

/// Reference to a terminal by id, used in control-channel attach/reattach.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalRef {
    pub terminal_id: TerminalId,
    pub session_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_output_truncates_at_cap() {
        let mut rec = ExecutionRecord::new(ExecutionId::generate(), "yes".into(), 8);
        rec.append_output(b"0123456789", false);
        assert_eq!(rec.stdout.len(), 8);
        rec.append_output(b"more", false);
        assert_eq!(rec.stdout.len(), 8, "no further growth once capped");
    }

    #[test]
    fn max_output_size_clamped_to_floor() {
        let rec = ExecutionRecord::new(ExecutionId::generate(), "x".into(), 1);
        assert_eq!(rec.max_output_size, MIN_MAX_OUTPUT_SIZE);
    }

    #[test]
    fn finish_transitions_forward_only() {
        let mut rec = ExecutionRecord::new(ExecutionId::generate(), "x".into(), 1024);
        rec.finish(Some(0), 10);
        assert_eq!(rec.status, ExecutionStatus::Completed);
        assert_eq!(rec.exit_code, Some(0));

        // A second finish() must not override the terminal state.
        rec.finish(Some(1), 999);
        assert_eq!(rec.status, ExecutionStatus::Completed);
        assert_eq!(rec.execution_time_ms, Some(10));
    }

    #[test]
    fn finish_nonzero_exit_is_failed() {
        let mut rec = ExecutionRecord::new(ExecutionId::generate(), "x".into(), 1024);
        rec.finish(Some(1), 5);
        assert_eq!(rec.status, ExecutionStatus::Failed);
    }

    #[test]
    fn finish_signal_only_exit_has_no_exit_code() {
        let mut rec = ExecutionRecord::new(ExecutionId::generate(), "x".into(), 1024);
        rec.finish(None, 5);
        assert_eq!(rec.status, ExecutionStatus::Failed);
        assert_eq!(rec.exit_code, None);
    }

    #[test]
    fn dimensions_clamp_to_bounds() {
        let d = Dimensions::clamped(0, 1000);
        assert_eq!(d.cols, Dimensions::MIN_COLS);
        assert_eq!(d.rows, Dimensions::MAX_ROWS);
    }

    #[test]
    fn execution_record_round_trips_through_json() {
        let mut rec = ExecutionRecord::new(ExecutionId::from_str_id("exec-1"), "echo hi".into(), 1024);
        rec.append_output(b"hi\n", false);
        let json = serde_json::to_string(&rec).unwrap();
        let back: ExecutionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stdout, b"hi\n");
        assert_eq!(back.execution_id, rec.execution_id);
    }
}
