//! Shared types, ids, and error taxonomy for the shell-execution daemon.

pub mod error;
pub mod history;
pub mod ids;
pub mod notify;
pub mod types;

pub use error::{Result, ShelldError};
