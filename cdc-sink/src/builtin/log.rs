use std::collections::HashMap;

use cdc_capture::CanonicalEvent;
use cdc_common::CResult;
use tracing::info;

use crate::sink::{Sink, SinkMetadata};

/// Logs each event's wire JSON at info level. Useful for smoke-testing a
/// configuration before wiring in a real publisher.
#[derive(Default)]
pub struct LogSink {
    name: String,
}

impl Sink for LogSink {
    fn metadata(&self) -> SinkMetadata {
        SinkMetadata { name: "log".into() }
    }

    fn init(&mut self, config: &HashMap<String, String>) -> CResult<()> {
        self.name = config.get("name").cloned().unwrap_or_else(|| "log".to_string());
        Ok(())
    }

    fn start(&mut self) -> CResult<()> {
        Ok(())
    }

    fn publish(&mut self, event: &CanonicalEvent) -> CResult<()> {
        info!(sink = %self.name, event = %event.to_wire_string(), "publish");
        Ok(())
    }

    fn stop(&mut self) -> CResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) -> CResult<()> {
        Ok(())
    }
}
