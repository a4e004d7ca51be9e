use std::sync::atomic::{AtomicU64, Ordering};

/// Per-sink visibility into the error-handling policy of §7: publish
/// errors and queue-full drops are counted and logged, never retried by
/// the core.
#[derive(Default)]
pub struct Counters {
    pub published: AtomicU64,
    pub publish_errors: AtomicU64,
    pub dropped: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            published: self.published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub published: u64,
    pub publish_errors: u64,
    pub dropped: u64,
}
