pub mod spawn;
pub mod supervisor;

pub use supervisor::{KillOutcome, ProcessSupervisor, StartRequest, StartResponse};
