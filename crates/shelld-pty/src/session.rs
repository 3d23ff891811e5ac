//! A single PTY-backed terminal session: spawn, resize, input, bounded
//! line-oriented output buffer, and the idle/closed lifecycle.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use shelld_core::ids::TerminalId;
use shelld_core::types::{Dimensions, ForegroundProcess, ShellType, TerminalStatus};
use shelld_core::{Result, ShelldError};
use tracing::warn;

use crate::ansi::strip_csi;
use crate::foreground::detect_foreground;

/// Output lines kept per terminal before the oldest are dropped. Bounds
/// memory for long-lived sessions; unrelated to the `read_position` cursor.
const OUTPUT_BUFFER_CAP: usize = 20_000;
const FOREGROUND_CACHE_MS: i64 = 5_000;

struct SessionState {
    output_buffer: Vec<String>,
    partial_line: String,
    read_position: usize,
    status: TerminalStatus,
    dimensions: Dimensions,
    last_activity: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    foreground_cache: Option<(DateTime<Utc>, Option<ForegroundProcess>)>,
}

pub struct TerminalSession {
    pub id: TerminalId,
    pub shell: ShellType,
    pub created_at: DateTime<Utc>,
    pub idle_minutes: u64,
    pid: i32,
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
    state: Arc<Mutex<SessionState>>,
    reader_alive: Arc<AtomicBool>,
}

impl TerminalSession {
    pub fn spawn(
        id: TerminalId,
        shell: ShellType,
        cwd: Option<&std::path::Path>,
        dimensions: Dimensions,
        idle_minutes: u64,
    ) -> Result<Arc<Self>> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: dimensions.rows,
                cols: dimensions.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("openpty failed: {e}")))?;

        let mut cmd = CommandBuilder::new(shell.program());
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("failed to spawn {}: {e}", shell.program())))?;
        drop(pair.slave);

        let pid = child.process_id().map(|p| p as i32).unwrap_or(-1);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("failed to take PTY writer: {e}")))?;

        let now = Utc::now();
        let state = Arc::new(Mutex::new(SessionState {
            output_buffer: Vec::new(),
            partial_line: String::new(),
            read_position: 0,
            status: TerminalStatus::Active,
            dimensions,
            last_activity: now,
            closed_at: None,
            foreground_cache: None,
        }));

        let reader_alive = Arc::new(AtomicBool::new(true));
        spawn_reader_thread(reader, state.clone(), reader_alive.clone());

        Ok(Arc::new(Self {
            id,
            shell,
            created_at: now,
            idle_minutes,
            pid,
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
            state,
            reader_alive,
        }))
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// Recompute `active -> idle` based on elapsed time since last activity;
    /// never overrides an explicit `closed`.
    pub fn refresh_status(&self) -> TerminalStatus {
        let mut state = self.state.lock().unwrap();
        if state.status == TerminalStatus::Closed {
            return TerminalStatus::Closed;
        }
        if !self.reader_alive.load(Ordering::SeqCst) {
            state.status = TerminalStatus::Closed;
            state.closed_at = Some(Utc::now());
            return TerminalStatus::Closed;
        }
        let idle_for = Utc::now().signed_duration_since(state.last_activity);
        state.status = if idle_for.num_minutes() >= self.idle_minutes as i64 {
            TerminalStatus::Idle
        } else {
            TerminalStatus::Active
        };
        state.status
    }

    pub fn dimensions(&self) -> Dimensions {
        self.state.lock().unwrap().dimensions
    }

    pub fn closed_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().closed_at
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.status == TerminalStatus::Closed {
                return Err(ShelldError::bad_request("terminal is closed"));
            }
        }
        let mut writer = self.writer.lock().unwrap();
        writer
            .write_all(bytes)
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("failed writing to PTY: {e}")))?;
        self.state.lock().unwrap().last_activity = Utc::now();
        Ok(())
    }

    pub fn resize(&self, dimensions: Dimensions) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            if state.status == TerminalStatus::Closed {
                return Err(ShelldError::bad_request("terminal is closed"));
            }
        }
        self.master
            .lock()
            .unwrap()
            .resize(PtySize {
                rows: dimensions.rows,
                cols: dimensions.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| ShelldError::Internal(anyhow::anyhow!("resize failed: {e}")))?;
        self.state.lock().unwrap().dimensions = dimensions;
        Ok(())
    }

    /// `getOutput`: slice `[start, start+count)`, advancing `read_position`.
    pub fn read_output(
        &self,
        start_line: Option<usize>,
        line_count: usize,
        include_ansi: bool,
    ) -> (String, usize, usize) {
        let mut state = self.state.lock().unwrap();
        let start = start_line.unwrap_or(state.read_position);
        let total = state.output_buffer.len();
        let start = start.min(total);
        let end = (start + line_count).min(total);
        let slice = &state.output_buffer[start..end];
        let joined = if include_ansi {
            slice.join("\n")
        } else {
            slice.iter().map(|l| strip_csi(l)).collect::<Vec<_>>().join("\n")
        };
        state.read_position = end;
        (joined, end, total)
    }

    pub fn reset_read_position(&self) {
        self.state.lock().unwrap().read_position = 0;
    }

    pub fn set_read_position(&self, n: usize) -> usize {
        let mut state = self.state.lock().unwrap();
        let clamped = n.min(state.output_buffer.len());
        state.read_position = clamped;
        clamped
    }

    pub fn get_read_position(&self) -> usize {
        self.state.lock().unwrap().read_position
    }

    /// Foreground process, refreshed at most every 5s (spec §4.6.1 guard cache).
    pub fn foreground(&self) -> Option<ForegroundProcess> {
        let mut state = self.state.lock().unwrap();
        if let Some((checked_at, cached)) = &state.foreground_cache {
            if Utc::now().signed_duration_since(*checked_at).num_milliseconds() < FOREGROUND_CACHE_MS {
                return cached.clone();
            }
        }
        let fg = detect_foreground(self.pid);
        state.foreground_cache = Some((Utc::now(), fg.clone()));
        fg
    }

    /// Kill the PTY child, mark closed, and clear the read cursor.
    pub fn close(&self) -> bool {
        let history_saved = {
            let mut state = self.state.lock().unwrap();
            if state.status == TerminalStatus::Closed {
                false
            } else {
                state.status = TerminalStatus::Closed;
                state.closed_at = Some(Utc::now());
                state.read_position = 0;
                true
            }
        };
        if history_saved {
            let mut child = self.child.lock().unwrap();
            if let Err(e) = child.kill() {
                warn!(terminal_id = %self.id, error = %e, "failed to kill PTY child");
            }
        }
        history_saved
    }
}

fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    state: Arc<Mutex<SessionState>>,
    alive: Arc<AtomicBool>,
) {
    std::thread::Builder::new()
        .name("shelld-pty-reader".to_string())
        .spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let mut guard = state.lock().unwrap();
                        guard.last_activity = Utc::now();
                        guard.partial_line.push_str(&String::from_utf8_lossy(&buf[..n]));
                        while let Some(pos) = guard.partial_line.find('\n') {
                            let line: String = guard.partial_line.drain(..=pos).collect();
                            let line = line.trim_end_matches(['\n', '\r']).to_string();
                            guard.output_buffer.push(line);
                            if guard.output_buffer.len() > OUTPUT_BUFFER_CAP {
                                let overflow = guard.output_buffer.len() - OUTPUT_BUFFER_CAP;
                                guard.output_buffer.drain(..overflow);
                                guard.read_position = guard.read_position.saturating_sub(overflow);
                            }
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            alive.store(false, Ordering::SeqCst);
        })
        .expect("failed to spawn PTY reader thread");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawns_and_reads_output() {
        let session = TerminalSession::spawn(
            TerminalId::generate(),
            ShellType::Bash,
            None,
            Dimensions::default(),
            30,
        )
        .expect("spawn");

        session.write_bytes(b"echo hello-from-pty\n").expect("write");

        let mut found = false;
        for _ in 0..50 {
            std::thread::sleep(std::time::Duration::from_millis(100));
            let (joined, _, _) = session.read_output(Some(0), 1000, false);
            if joined.contains("hello-from-pty") {
                found = true;
                break;
            }
        }
        assert!(found, "expected PTY output to contain echoed text");
        session.close();
    }

    #[test]
    fn close_is_idempotent() {
        let session = TerminalSession::spawn(
            TerminalId::generate(),
            ShellType::Bash,
            None,
            Dimensions::default(),
            30,
        )
        .expect("spawn");
        assert!(session.close());
        assert!(!session.close());
    }
}
