pub mod fabric;
pub mod filesink;
pub mod pipeline;
pub mod registry;
pub mod replay;
pub mod subscriber;

pub use fabric::PublisherFabric;
pub use filesink::FileSinkSubscriber;
pub use pipeline::PipelineReader;
pub use registry::{FileRegistry, InMemoryFileRegistry, OutputKind};
pub use replay::{BufferEntry, ReplayBufferSubscriber, StreamState};
pub use subscriber::Subscriber;
