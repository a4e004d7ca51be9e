//! The sink contract (§6.3): every downstream publisher — file, message
//! bus, HTTP, embedded scripting host — implements this trait. The core
//! never sees more than this surface.

use std::collections::HashMap;

use cdc_capture::CanonicalEvent;
use cdc_common::CResult;

#[derive(Debug, Clone)]
pub struct SinkMetadata {
    pub name: String,
}

/// Lifecycle state a sink instance moves through. `stop` is idempotent:
/// calling it on an already-`Stopped` sink is a no-op, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Loaded,
    Started,
    Stopped,
}

pub trait Sink: Send {
    fn metadata(&self) -> SinkMetadata;

    fn init(&mut self, config: &HashMap<String, String>) -> CResult<()>;

    fn start(&mut self) -> CResult<()>;

    fn publish(&mut self, event: &CanonicalEvent) -> CResult<()>;

    fn stop(&mut self) -> CResult<()>;

    fn cleanup(&mut self) -> CResult<()>;

    /// Default: always healthy. Sinks with a real downstream connection
    /// should override this.
    fn health(&self) -> CResult<()> {
        Ok(())
    }

    /// Default: publish one at a time. Sinks with a batch-native
    /// transport should override this.
    fn publish_batch(&mut self, events: &[CanonicalEvent]) -> CResult<()> {
        for event in events {
            self.publish(event)?;
        }
        Ok(())
    }
}
