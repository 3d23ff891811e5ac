pub mod client;
pub mod protocol;
pub mod server;
pub mod socket;

pub use protocol::{ControlRequest, ControlResponse};
pub use server::ControlHandler;
