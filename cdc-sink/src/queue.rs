//! Bounded per-sink queue (§4.8): non-blocking producer, blocking
//! consumer, drop-on-full. One queue per sink, guarded by its own
//! mutex and condition variable — no cross-sink locks are ever held
//! simultaneously.

use std::sync::{Condvar, Mutex};

use cdc_capture::CanonicalEvent;
use ringbuffer::{AllocRingBuffer, RingBuffer};

pub const DEFAULT_QUEUE_DEPTH: usize = 1024;

struct QueueState {
    buffer: AllocRingBuffer<CanonicalEvent>,
    stopping: bool,
}

pub struct SinkQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
}

impl SinkQueue {
    pub fn new(capacity: usize) -> SinkQueue {
        SinkQueue {
            state: Mutex::new(QueueState {
                buffer: AllocRingBuffer::new(capacity.max(1)),
                stopping: false,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Never blocks. Returns `false` (and the caller should count a
    /// drop) if the queue was already at capacity — the new event is
    /// discarded, older queued events are left untouched.
    pub fn try_enqueue(&self, event: CanonicalEvent) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.buffer.is_full() {
            return false;
        }
        state.buffer.push(event);
        drop(state);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an event is available, or the queue has been told to
    /// stop and is empty — at which point the worker should exit.
    pub fn dequeue_blocking(&self) -> Option<CanonicalEvent> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(event) = state.buffer.dequeue() {
                return Some(event);
            }
            if state.stopping {
                return None;
            }
            state = self.not_empty.wait(state).unwrap();
        }
    }

    /// Wakes a blocked worker and tells it to drain and exit rather than
    /// wait for more events.
    pub fn signal_stop(&self) {
        let mut state = self.state.lock().unwrap();
        state.stopping = true;
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_capture::EventKind;
    use cdc_common::Position;

    fn event(offset: u64) -> CanonicalEvent {
        CanonicalEvent {
            kind: EventKind::Insert,
            txn: "t".into(),
            schema: "db".into(),
            table: "t".into(),
            primary_key_columns: vec![],
            rows: vec![],
            position: Position::Mysql { file_name: "f".into(), offset },
            source_label: "f".into(),
        }
    }

    #[test]
    fn fifo_order_within_a_queue() {
        let q = SinkQueue::new(8);
        for i in 0..5 {
            assert!(q.try_enqueue(event(i)));
        }
        for i in 0..5 {
            let ev = q.dequeue_blocking().unwrap();
            assert_eq!(ev.position, Position::Mysql { file_name: "f".into(), offset: i });
        }
    }

    #[test]
    fn enqueue_drops_when_full_without_blocking() {
        let q = SinkQueue::new(4);
        for i in 0..4 {
            assert!(q.try_enqueue(event(i)));
        }
        // Queue at capacity: further enqueues are rejected, not overwritten.
        assert!(!q.try_enqueue(event(100)));
        assert!(!q.try_enqueue(event(101)));

        let first = q.dequeue_blocking().unwrap();
        assert_eq!(first.position, Position::Mysql { file_name: "f".into(), offset: 0 });
    }

    #[test]
    fn stop_with_empty_queue_unblocks_dequeue() {
        let q = SinkQueue::new(4);
        q.signal_stop();
        assert!(q.dequeue_blocking().is_none());
    }

    #[test]
    fn stop_drains_remaining_events_before_returning_none() {
        let q = SinkQueue::new(4);
        assert!(q.try_enqueue(event(1)));
        q.signal_stop();
        assert!(q.dequeue_blocking().is_some());
        assert!(q.dequeue_blocking().is_none());
    }
}
