//! The notifier seam between producers (Process Supervisor, Terminal
//! Manager) and the Publisher Fabric, expressed as a trait so
//! `shelld-process`/`shelld-pty` don't need a dependency on `shelld-pubsub`.

use crate::ids::ExecutionId;

/// Sink for one execution's lifecycle and output events. The Publisher
/// Fabric implements this and fans out to its subscribers; callers never
/// see the subscriber set.
pub trait ExecutionNotifier: Send + Sync {
    fn notify_process_start(&self, execution_id: &ExecutionId);
    fn notify_output_data(&self, execution_id: &ExecutionId, bytes: &[u8], is_stderr: bool);
    fn notify_process_end(&self, execution_id: &ExecutionId, exit_code: Option<i32>);
    fn notify_error(&self, execution_id: &ExecutionId, message: &str);
}

/// No-op notifier for tests and standalone use of the supervisor.
pub struct NullNotifier;

impl ExecutionNotifier for NullNotifier {
    fn notify_process_start(&self, _execution_id: &ExecutionId) {}
    fn notify_output_data(&self, _execution_id: &ExecutionId, _bytes: &[u8], _is_stderr: bool) {}
    fn notify_process_end(&self, _execution_id: &ExecutionId, _exit_code: Option<i32>) {}
    fn notify_error(&self, _execution_id: &ExecutionId, _message: &str) {}
}
