//! Process Supervisor: one-shot `sh -c` execution with
//! bounded output capture, stdin backpressure, and timeout escalation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::warn;

use shelld_core::history::{HistorySink, NullHistorySink};
use shelld_core::ids::ExecutionId;
use shelld_core::notify::{ExecutionNotifier, NullNotifier};
use shelld_core::types::{
    ExecutionRecord, ExecutionStatus, SignalKind, DEFAULT_MAX_OUTPUT_SIZE, DEFAULT_TIMEOUT_SECONDS,
    KILL_ESCALATION_GRACE_MS, MIN_MAX_OUTPUT_SIZE, MIN_TIMEOUT_SECONDS,
};
use shelld_core::{Result, ShelldError};

use crate::spawn::{build_command, signal_process_group};

const READ_BUF_SIZE: usize = 4096;

/// Inputs to `ProcessSupervisor::start`.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub timeout_seconds: Option<u64>,
    pub capture_stderr: Option<bool>,
    pub max_output_size: Option<usize>,
    pub input_data: Option<Vec<u8>>,
    pub safety_evaluation: Option<serde_json::Value>,
    pub execution_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct StartResponse {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct KillOutcome {
    pub success: bool,
    pub message: String,
}

struct RunningHandle {
    pid: i32,
}

pub struct ProcessSupervisor {
    default_cwd: PathBuf,
    executions: RwLock<HashMap<ExecutionId, Arc<RwLock<ExecutionRecord>>>>,
    running: RwLock<HashMap<ExecutionId, RunningHandle>>,
    notifier: Arc<dyn ExecutionNotifier>,
    history: Arc<dyn HistorySink>,
}

impl ProcessSupervisor {
    pub fn new(default_cwd: PathBuf) -> Arc<Self> {
        Self::with_collaborators(default_cwd, Arc::new(NullNotifier), Arc::new(NullHistorySink))
    }

    pub fn with_collaborators(
        default_cwd: PathBuf,
        notifier: Arc<dyn ExecutionNotifier>,
        history: Arc<dyn HistorySink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            default_cwd,
            executions: RwLock::new(HashMap::new()),
            running: RwLock::new(HashMap::new()),
            notifier,
            history,
        })
    }

    pub fn execution_count(&self) -> usize {
        self.executions.try_read().map(|m| m.len()).unwrap_or(0)
    }

    /// Accept and spawn a command. Returns once the Execution Record exists
    /// with `status=running` — this is the at-most-once accept point a
    /// concurrent `kill` can race against safely.
    pub async fn start(self: &Arc<Self>, req: StartRequest) -> Result<StartResponse> {
        if req.command.trim().is_empty() {
            return Err(ShelldError::bad_request("command must not be empty"));
        }

        let execution_id = match req.execution_id {
            Some(id) if !id.is_empty() => ExecutionId::from_str_id(id),
            _ => ExecutionId::generate(),
        };

        let max_output_size = req
            .max_output_size
            .unwrap_or(DEFAULT_MAX_OUTPUT_SIZE)
            .max(MIN_MAX_OUTPUT_SIZE);
        let timeout = Duration::from_secs(
            req.timeout_seconds
                .unwrap_or(DEFAULT_TIMEOUT_SECONDS)
                .max(MIN_TIMEOUT_SECONDS),
        );
        let capture_stderr = req.capture_stderr.unwrap_or(true);
        let cwd = req.cwd.unwrap_or_else(|| self.default_cwd.clone());

        let mut record = ExecutionRecord::new(execution_id.clone(), req.command.clone(), max_output_size);
        record.safety_evaluation = req.safety_evaluation.clone();
        let record = Arc::new(RwLock::new(record));

        {
            let mut executions = self.executions.write().await;
            if executions.contains_key(&execution_id) {
                return Err(ShelldError::bad_request(format!(
                    "execution id '{execution_id}' already in use"
                )));
            }
            executions.insert(execution_id.clone(), record.clone());
        }

        let this = self.clone();
        let exec_id_for_task = execution_id.clone();
        tokio::spawn(async move {
            this.run_execution(
                exec_id_for_task,
                record,
                cwd,
                timeout,
                capture_stderr,
                req.input_data,
            )
            .await;
        });

        Ok(StartResponse {
            execution_id,
            status: ExecutionStatus::Running,
        })
    }

    async fn run_execution(
        self: Arc<Self>,
        execution_id: ExecutionId,
        record: Arc<RwLock<ExecutionRecord>>,
        cwd: PathBuf,
        timeout: Duration,
        capture_stderr: bool,
        input_data: Option<Vec<u8>>,
    ) {
        let start_instant = Instant::now();
        let mut cmd = {
            let guard = record.read().await;
            build_command(&guard.command, Some(&cwd), input_data.is_some())
        };

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(execution_id = %execution_id, error = %e, "failed to spawn command");
                self.notifier.notify_error(&execution_id, &e.to_string());
                let mut guard = record.write().await;
                guard.finish(None, start_instant.elapsed().as_millis() as u64);
                self.notifier.notify_process_end(&execution_id, None);
                self.history.record(&guard);
                return;
            }
        };

        let Some(pid) = child.id().map(|p| p as i32) else {
            // Already reaped before we could record its pid; treat as failed.
            let mut guard = record.write().await;
            guard.finish(None, start_instant.elapsed().as_millis() as u64);
            self.notifier.notify_process_end(&execution_id, None);
            self.history.record(&guard);
            return;
        };

        self.running
            .write()
            .await
            .insert(execution_id.clone(), RunningHandle { pid });
        self.notifier.notify_process_start(&execution_id);

        if let Some(data) = input_data {
            if let Some(mut stdin) = child.stdin.take() {
                tokio::spawn(async move {
                    if let Err(e) = async {
                        stdin.write_all(&data).await?;
                        stdin.shutdown().await?;
                        Ok::<_, std::io::Error>(())
                    }
                    .await
                    {
                        warn!(error = %e, "stdin write failed");
                        signal_process_group(pid, libc::SIGTERM);
                    }
                });
            }
        }

        let stdout = child.stdout.take();
        let stderr = if capture_stderr { child.stderr.take() } else { None };
        let timed_out = Arc::new(AtomicBool::new(false));

        self.drain_output(&execution_id, &record, stdout, stderr, timeout, pid, timed_out.clone())
            .await;

        let status = child.wait().await.ok();
        let exit_code = status.and_then(|s| code_or_none(&s));
        let elapsed_ms = start_instant.elapsed().as_millis() as u64;

        self.running.write().await.remove(&execution_id);

        let mut guard = record.write().await;
        if timed_out.load(Ordering::SeqCst) {
            guard.finish(None, elapsed_ms);
        } else {
            guard.finish(exit_code, elapsed_ms);
        }
        self.notifier.notify_process_end(&execution_id, guard.exit_code);
        self.history.record(&guard);
    }

    #[allow(clippy::too_many_arguments)]
    async fn drain_output(
        &self,
        execution_id: &ExecutionId,
        record: &Arc<RwLock<ExecutionRecord>>,
        stdout: Option<tokio::process::ChildStdout>,
        stderr: Option<tokio::process::ChildStderr>,
        timeout: Duration,
        pid: i32,
        timed_out: Arc<AtomicBool>,
    ) {
        let mut stdout_done = stdout.is_none();
        let mut stderr_done = stderr.is_none();
        let mut stdout = stdout;
        let mut stderr = stderr;
        let mut stdout_buf = [0u8; READ_BUF_SIZE];
        let mut stderr_buf = [0u8; READ_BUF_SIZE];
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut escalated = false;

        while !stdout_done || !stderr_done {
            tokio::select! {
                result = read_or_pending(&mut stdout, &mut stdout_buf), if !stdout_done => {
                    match result {
                        Some(Ok(0)) | None => stdout_done = true,
                        Some(Ok(n)) => {
                            let mut guard = record.write().await;
                            guard.append_output(&stdout_buf[..n], false);
                            drop(guard);
                            self.notifier.notify_output_data(execution_id, &stdout_buf[..n], false);
                        }
                        Some(Err(_)) => stdout_done = true,
                    }
                }
                result = read_or_pending(&mut stderr, &mut stderr_buf), if !stderr_done => {
                    match result {
                        Some(Ok(0)) | None => stderr_done = true,
                        Some(Ok(n)) => {
                            let mut guard = record.write().await;
                            guard.append_output(&stderr_buf[..n], true);
                            drop(guard);
                            self.notifier.notify_output_data(execution_id, &stderr_buf[..n], true);
                        }
                        Some(Err(_)) => stderr_done = true,
                    }
                }
                () = &mut deadline, if !escalated => {
                    escalated = true;
                    timed_out.store(true, Ordering::SeqCst);
                    warn!(execution_id = %execution_id, "execution timed out; sending SIGTERM");
                    signal_process_group(pid, libc::SIGTERM);
                    let pid_for_kill = pid;
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(KILL_ESCALATION_GRACE_MS)).await;
                        signal_process_group(pid_for_kill, libc::SIGKILL);
                    });
                }
            }
        }
    }

    /// `GET /v1/exec/{id}` (sans captured output) and control-channel status lookups.
    pub async fn get_record(&self, execution_id: &ExecutionId) -> Result<ExecutionRecord> {
        let executions = self.executions.read().await;
        let record = executions
            .get(execution_id)
            .ok_or_else(|| ShelldError::not_found("execution", execution_id.to_string()))?;
        Ok(record.read().await.clone())
    }

    /// `GET /v1/exec/{id}/outputs`.
    pub async fn get_outputs(&self, execution_id: &ExecutionId) -> Result<(Vec<u8>, Vec<u8>)> {
        let record = self.get_record(execution_id).await?;
        Ok((record.stdout, record.stderr))
    }

    /// Kill semantics: idempotent on already-terminated
    /// executions, escalates to SIGKILL after the grace period when `force`.
    pub async fn kill(
        &self,
        execution_id: &ExecutionId,
        signal: SignalKind,
        force: bool,
    ) -> Result<KillOutcome> {
        {
            let executions = self.executions.read().await;
            if !executions.contains_key(execution_id) {
                return Err(ShelldError::not_found("execution", execution_id.to_string()));
            }
        }

        let pid = {
            let running = self.running.read().await;
            running.get(execution_id).map(|h| h.pid)
        };

        let Some(pid) = pid else {
            return Ok(KillOutcome {
                success: true,
                message: "No running process".to_string(),
            });
        };

        signal_process_group(pid, signal.as_libc());

        if force {
            tokio::spawn(schedule_force_kill(execution_id.clone(), pid));
        }

        Ok(KillOutcome {
            success: true,
            message: "signal sent".to_string(),
        })
    }
}

async fn schedule_force_kill(_execution_id: ExecutionId, pid: i32) {
    tokio::time::sleep(Duration::from_millis(KILL_ESCALATION_GRACE_MS)).await;
    signal_process_group(pid, libc::SIGKILL);
}

fn code_or_none(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Read into `buf` if the stream is present, otherwise never resolve — lets
/// the caller `select!` on an absent stderr handle without special-casing it.
async fn read_or_pending<R: AsyncReadExt + Unpin>(
    stream: &mut Option<R>,
    buf: &mut [u8],
) -> Option<std::io::Result<usize>> {
    match stream {
        Some(r) => Some(r.read(buf).await),
        None => std::future::pending().await,
    }
}
