//! The subscriber hook set. A subscriber defines any subset of
//! {start, data, end, error}; unimplemented hooks default to no-ops.

use async_trait::async_trait;
use shelld_core::ids::ExecutionId;

#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn on_start(&self, _execution_id: &ExecutionId) {}
    async fn on_data(&self, _execution_id: &ExecutionId, _bytes: &[u8], _is_stderr: bool) {}
    async fn on_end(&self, _execution_id: &ExecutionId, _exit_code: Option<i32>) {}
    async fn on_error(&self, _execution_id: &ExecutionId, _message: &str) {}
}
