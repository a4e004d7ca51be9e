use std::collections::HashMap;

use cdc_capture::CanonicalEvent;
use cdc_common::CResult;

use crate::sink::{Sink, SinkMetadata};

/// Discards every event. Exists to exercise the sink contract end to end
/// without depending on a real downstream system.
#[derive(Default)]
pub struct NullSink;

impl Sink for NullSink {
    fn metadata(&self) -> SinkMetadata {
        SinkMetadata { name: "null".into() }
    }

    fn init(&mut self, _config: &HashMap<String, String>) -> CResult<()> {
        Ok(())
    }

    fn start(&mut self) -> CResult<()> {
        Ok(())
    }

    fn publish(&mut self, _event: &CanonicalEvent) -> CResult<()> {
        Ok(())
    }

    fn stop(&mut self) -> CResult<()> {
        Ok(())
    }

    fn cleanup(&mut self) -> CResult<()> {
        Ok(())
    }
}
