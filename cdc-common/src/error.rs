use std::fmt;
use std::io;

/// Error taxonomy for the whole pipeline.
///
/// The variants line up with the kinds in the error-handling design: the
/// first two are process-fatal, everything else is counted and logged by
/// the component that raised it.
#[derive(Debug)]
pub enum ReError {
    /// Configuration error — fatal at startup.
    Config(String),
    /// Connect / handshake error — fatal to that source.
    Connect(String),
    /// Decode-protocol error — fatal for that source, stream desynchronized.
    Protocol(String),
    /// MySQL column-name side-channel lookup failed — degrade, don't fail.
    SchemaLookup(String),
    /// A sink failed to load/initialize — skip that sink, others still start.
    SinkLoad(String),
    /// A sink's `publish` call returned an error — counted, not retried.
    SinkPublish(String),
    /// Checkpoint file could not be written — logged, decode loop continues.
    Checkpoint(String),
    /// A wrapped I/O error, not otherwise classified above.
    Io(io::Error),
    /// Catch-all for invariant violations that should never happen.
    Bug(String),
}

impl fmt::Display for ReError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReError::Config(s) => write!(f, "configuration error: {s}"),
            ReError::Connect(s) => write!(f, "connect/handshake error: {s}"),
            ReError::Protocol(s) => write!(f, "protocol decode error: {s}"),
            ReError::SchemaLookup(s) => write!(f, "schema lookup error: {s}"),
            ReError::SinkLoad(s) => write!(f, "sink load error: {s}"),
            ReError::SinkPublish(s) => write!(f, "sink publish error: {s}"),
            ReError::Checkpoint(s) => write!(f, "checkpoint error: {s}"),
            ReError::Io(e) => write!(f, "io error: {e}"),
            ReError::Bug(s) => write!(f, "bug: {s}"),
        }
    }
}

impl std::error::Error for ReError {}

impl From<io::Error> for ReError {
    fn from(e: io::Error) -> Self {
        ReError::Io(e)
    }
}

impl From<serde_json::Error> for ReError {
    fn from(e: serde_json::Error) -> Self {
        ReError::Protocol(format!("json: {e}"))
    }
}

impl ReError {
    /// Whether this error kind is process-fatal per the propagation policy.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReError::Config(_) | ReError::Connect(_) | ReError::Protocol(_)
        )
    }
}

pub type CResult<T> = Result<T, ReError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(ReError::Config("x".into()).is_fatal());
        assert!(ReError::Connect("x".into()).is_fatal());
        assert!(ReError::Protocol("x".into()).is_fatal());
        assert!(!ReError::SchemaLookup("x".into()).is_fatal());
        assert!(!ReError::SinkPublish("x".into()).is_fatal());
        assert!(!ReError::Checkpoint("x".into()).is_fatal());
    }

    #[test]
    fn display_includes_kind() {
        let e = ReError::SinkPublish("boom".into());
        assert!(e.to_string().contains("boom"));
    }
}
