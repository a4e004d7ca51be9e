pub mod log;
pub mod null;

pub use log::LogSink;
pub use null::NullSink;
