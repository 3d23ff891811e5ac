use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use shelld_core::ids::ExecutionId;
use shelld_process::ProcessSupervisor;

/// Hook run before an execution is handed to the Process Supervisor, so the
/// daemon can attach its default subscribers (file sink, replay buffer) to
/// the execution's topic before the first event can possibly fire. Kept as a
/// trait so this crate never depends on the publisher fabric directly.
#[async_trait]
pub trait ExecutionPrep: Send + Sync {
    async fn prepare(&self, execution_id: &ExecutionId);
}

pub struct NullExecutionPrep;

#[async_trait]
impl ExecutionPrep for NullExecutionPrep {
    async fn prepare(&self, _execution_id: &ExecutionId) {}
}

#[derive(Clone)]
pub struct AppState {
    pub process: Arc<ProcessSupervisor>,
    pub prep: Arc<dyn ExecutionPrep>,
    pub started_at: Instant,
    pub version: &'static str,
}
