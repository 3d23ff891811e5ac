//! Terminal Manager (C6): creates and tracks PTY sessions, enforces the
//! program guard on `sendInput`, and sweeps closed sessions after 30s.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use shelld_core::ids::TerminalId;
use shelld_core::types::{Dimensions, ForegroundProcess, ShellType, TerminalStatus};
use shelld_core::{Result, ShelldError};

use crate::foreground::guard_allows;
use crate::input::{decode_control_codes, decode_plain, decode_raw_bytes};
use crate::session::TerminalSession;

const CLOSED_RETENTION_SECONDS: i64 = 30;
const DEFAULT_IDLE_MINUTES: u64 = 30;
const DEFAULT_LINE_COUNT: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct SendInputRequest {
    pub input: String,
    pub execute: bool,
    pub control_codes: bool,
    pub raw_bytes: bool,
    pub send_to: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TerminalSummary {
    pub terminal_id: TerminalId,
    pub status: TerminalStatus,
    pub dimensions: Dimensions,
}

pub struct TerminalManager {
    default_cwd: PathBuf,
    sessions: RwLock<HashMap<TerminalId, Arc<TerminalSession>>>,
}

impl TerminalManager {
    pub fn new(default_cwd: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            default_cwd,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn terminal_count(&self) -> usize {
        self.sessions.try_read().map(|m| m.len()).unwrap_or(0)
    }

    pub async fn create(
        &self,
        shell: ShellType,
        cwd: Option<PathBuf>,
        dimensions: Dimensions,
        idle_minutes: Option<u64>,
    ) -> Result<TerminalId> {
        let id = TerminalId::generate();
        let cwd = cwd.unwrap_or_else(|| self.default_cwd.clone());
        let session = TerminalSession::spawn(
            id.clone(),
            shell,
            Some(&cwd),
            Dimensions::clamped(dimensions.cols, dimensions.rows),
            idle_minutes.unwrap_or(DEFAULT_IDLE_MINUTES),
        )?;
        self.sessions.write().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn get(&self, terminal_id: &TerminalId) -> Result<Arc<TerminalSession>> {
        self.sessions
            .read()
            .await
            .get(terminal_id)
            .cloned()
            .ok_or_else(|| ShelldError::not_found("terminal", terminal_id.to_string()))
    }

    pub async fn list(&self) -> Vec<TerminalSummary> {
        let sessions = self.sessions.read().await;
        sessions
            .values()
            .map(|s| TerminalSummary {
                terminal_id: s.id.clone(),
                status: s.refresh_status(),
                dimensions: s.dimensions(),
            })
            .collect()
    }

    pub async fn status(&self, terminal_id: &TerminalId) -> Result<TerminalStatus> {
        Ok(self.get(terminal_id).await?.refresh_status())
    }

    pub async fn foreground_process(&self, terminal_id: &TerminalId) -> Result<Option<ForegroundProcess>> {
        Ok(self.get(terminal_id).await?.foreground())
    }

    pub async fn resize(&self, terminal_id: &TerminalId, cols: u16, rows: u16) -> Result<Dimensions> {
        let session = self.get(terminal_id).await?;
        let dims = Dimensions::clamped(cols, rows);
        session.resize(dims)?;
        Ok(dims)
    }

    pub async fn send_input(&self, terminal_id: &TerminalId, req: SendInputRequest) -> Result<()> {
        let session = self.get(terminal_id).await?;

        if let Some(send_to) = &req.send_to {
            if send_to != "*" {
                let fg = session.foreground();
                if !guard_allows(send_to, fg.as_ref()) {
                    return Err(ShelldError::bad_request("Program guard failed"));
                }
            }
        }

        let mode_count = [req.raw_bytes, req.control_codes].iter().filter(|b| **b).count();
        if mode_count > 1 {
            return Err(ShelldError::bad_request(
                "only one of rawBytes/controlCodes may be set",
            ));
        }

        let mut bytes = if req.raw_bytes {
            decode_raw_bytes(&req.input)?
        } else if req.control_codes {
            let mut decoded = decode_control_codes(&req.input)?;
            if req.execute {
                decoded.push(b'\r');
            }
            decoded
        } else {
            decode_plain(&req.input)
        };

        if !req.raw_bytes && !req.control_codes && req.execute {
            bytes.push(b'\r');
        }

        session.write_bytes(&bytes)?;
        Ok(())
    }

    pub async fn get_output(
        &self,
        terminal_id: &TerminalId,
        start_line: Option<usize>,
        line_count: Option<usize>,
        include_ansi: bool,
    ) -> Result<(String, usize, usize)> {
        let session = self.get(terminal_id).await?;
        Ok(session.read_output(start_line, line_count.unwrap_or(DEFAULT_LINE_COUNT), include_ansi))
    }

    pub async fn reset_read_position(&self, terminal_id: &TerminalId) -> Result<()> {
        self.get(terminal_id).await?.reset_read_position();
        Ok(())
    }

    pub async fn set_read_position(&self, terminal_id: &TerminalId, n: usize) -> Result<usize> {
        Ok(self.get(terminal_id).await?.set_read_position(n))
    }

    pub async fn get_read_position(&self, terminal_id: &TerminalId) -> Result<usize> {
        Ok(self.get(terminal_id).await?.get_read_position())
    }

    pub async fn close(&self, terminal_id: &TerminalId) -> Result<(bool, chrono::DateTime<Utc>)> {
        let session = self.get(terminal_id).await?;
        let history_saved = session.close();
        Ok((history_saved, Utc::now()))
    }

    /// Drop sessions that have been closed for more than 30s.
    pub async fn sweep_closed(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| match session.closed_at() {
            Some(closed_at) => {
                Utc::now().signed_duration_since(closed_at).num_seconds() < CLOSED_RETENTION_SECONDS
            }
            None => true,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_close_roundtrip() {
        let manager = TerminalManager::new(std::env::temp_dir());
        let id = manager
            .create(ShellType::Bash, None, Dimensions::default(), None)
            .await
            .expect("create");
        assert!(manager.status(&id).await.is_ok());
        let (saved, _) = manager.close(&id).await.expect("close");
        assert!(saved);
    }

    #[tokio::test]
    async fn unknown_terminal_is_not_found() {
        let manager = TerminalManager::new(std::env::temp_dir());
        let bogus = TerminalId::generate();
        assert!(manager.status(&bogus).await.is_err());
    }

    #[tokio::test]
    async fn wildcard_send_to_bypasses_guard() {
        let manager = TerminalManager::new(std::env::temp_dir());
        let id = manager
            .create(ShellType::Bash, None, Dimensions::default(), None)
            .await
            .expect("create");
        let req = SendInputRequest {
            input: "echo hi".to_string(),
            execute: true,
            control_codes: false,
            raw_bytes: false,
            send_to: Some("*".to_string()),
        };
        assert!(manager.send_input(&id, req).await.is_ok());
        manager.close(&id).await.ok();
    }
}
