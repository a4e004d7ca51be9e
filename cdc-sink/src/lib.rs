pub mod builtin;
pub mod counters;
pub mod queue;
pub mod registry;
pub mod sink;

pub use counters::{CounterSnapshot, Counters};
pub use queue::SinkQueue;
pub use registry::SinkRegistry;
pub use sink::{Sink, SinkMetadata, SinkState};
