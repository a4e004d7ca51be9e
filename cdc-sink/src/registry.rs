//! Sink registry and dispatch (§4.7, §4.8): loads publisher entries from
//! configuration, instantiates each sink, and fans canonical events out
//! to their per-sink queues.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cdc_capture::CanonicalEvent;
use cdc_common::config::PublisherEntry;
use tracing::{info, warn};

use crate::builtin::{LogSink, NullSink};
use crate::counters::{CounterSnapshot, Counters};
use crate::queue::SinkQueue;
use crate::sink::Sink;

struct SinkHandle {
    name: String,
    publish_schemas: Vec<String>,
    queue: Arc<SinkQueue>,
    counters: Arc<Counters>,
}

/// `should_publish` (§4.8): an empty allow-list means "all schemas".
/// Evaluated by the dispatcher before any copy is made, so events no
/// sink wants are never cloned.
fn should_publish(allow_list: &[String], schema: &str) -> bool {
    allow_list.is_empty() || allow_list.iter().any(|s| s == schema)
}

fn instantiate(name: &str) -> Option<Box<dyn Sink>> {
    match name {
        "null" => Some(Box::new(NullSink)),
        "log" => Some(Box::new(LogSink::default())),
        _ => None,
    }
}

fn run_worker(mut sink: Box<dyn Sink>, queue: Arc<SinkQueue>, counters: Arc<Counters>, name: String) {
    while let Some(event) = queue.dequeue_blocking() {
        match sink.publish(&event) {
            Ok(()) => {
                counters.published.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(e) => {
                counters.publish_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!(sink = %name, error = %e, "sink publish failed");
            }
        }
    }
    if let Err(e) = sink.stop() {
        warn!(sink = %name, error = %e, "sink stop failed");
    }
    if let Err(e) = sink.cleanup() {
        warn!(sink = %name, error = %e, "sink cleanup failed");
    }
}

pub struct SinkRegistry {
    handles: Vec<SinkHandle>,
    workers: Vec<JoinHandle<()>>,
}

impl SinkRegistry {
    /// Loads and starts every active publisher entry. A sink that fails
    /// to load or initialize is logged and skipped — the rest still
    /// start (§7: "Sink load/init error: log+skip, others still start").
    pub fn load(publishers: &[PublisherEntry]) -> SinkRegistry {
        let mut handles = Vec::new();
        let mut workers = Vec::new();

        for entry in publishers {
            let plugin = &entry.plugin;
            if !plugin.active {
                info!(sink = %plugin.name, "sink disabled, skipping");
                continue;
            }

            let Some(mut sink) = instantiate(&plugin.name) else {
                warn!(sink = %plugin.name, "unknown sink kind, skipping");
                continue;
            };

            if let Err(e) = sink.init(&plugin.config) {
                warn!(sink = %plugin.name, error = %e, "sink init failed, skipping");
                continue;
            }
            if let Err(e) = sink.start() {
                warn!(sink = %plugin.name, error = %e, "sink start failed, skipping");
                continue;
            }

            let queue = Arc::new(SinkQueue::new(plugin.max_queue_depth));
            let counters = Arc::new(Counters::default());
            let name = plugin.name.clone();

            let worker_queue = Arc::clone(&queue);
            let worker_counters = Arc::clone(&counters);
            let worker_name = name.clone();
            workers.push(thread::spawn(move || {
                run_worker(sink, worker_queue, worker_counters, worker_name)
            }));

            handles.push(SinkHandle {
                name,
                publish_schemas: plugin.publish_schemas.clone(),
                queue,
                counters,
            });
        }

        SinkRegistry { handles, workers }
    }

    /// Dispatches one canonical event to every sink whose allow-list
    /// matches its schema (§4.8). FIFO within a sink, unordered across
    /// sinks. The producer never blocks: a full queue counts a drop and
    /// moves on.
    pub fn dispatch(&self, event: &CanonicalEvent) {
        for handle in &self.handles {
            if !should_publish(&handle.publish_schemas, &event.schema) {
                continue;
            }
            if !handle.queue.try_enqueue(event.clone()) {
                handle.counters.dropped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!(sink = %handle.name, "sink queue full, dropping event");
            }
        }
    }

    pub fn counters(&self) -> Vec<(String, CounterSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name.clone(), h.counters.snapshot()))
            .collect()
    }

    /// Signals every sink's queue to drain and stop, then joins every
    /// worker thread. Idempotent at the queue level; calling this twice
    /// is safe but the second call has nothing left to join.
    pub fn shutdown(self) {
        for handle in &self.handles {
            handle.queue.signal_stop();
        }
        for worker in self.workers {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdc_capture::EventKind;
    use cdc_common::config::PluginConfig;
    use cdc_common::Position;
    use std::collections::HashMap;

    fn event(schema: &str) -> CanonicalEvent {
        CanonicalEvent {
            kind: EventKind::Insert,
            txn: "t".into(),
            schema: schema.into(),
            table: "t".into(),
            primary_key_columns: vec![],
            rows: vec![],
            position: Position::Mysql { file_name: "f".into(), offset: 1 },
            source_label: "f".into(),
        }
    }

    fn entry(name: &str, schemas: &[&str], max_queue_depth: usize) -> PublisherEntry {
        PublisherEntry {
            plugin: PluginConfig {
                name: name.to_string(),
                library_path: None,
                active: true,
                max_queue_depth,
                publish_schemas: schemas.iter().map(|s| s.to_string()).collect(),
                config: HashMap::new(),
            },
        }
    }

    #[test]
    fn should_publish_empty_allow_list_matches_all() {
        assert!(should_publish(&[], "anything"));
        assert!(should_publish(&["db1".to_string()], "db1"));
        assert!(!should_publish(&["db1".to_string()], "db2"));
    }

    #[test]
    fn dispatch_filters_by_schema_before_enqueue() {
        let registry = SinkRegistry::load(&[entry("null", &["db1"], 16)]);
        registry.dispatch(&event("db1"));
        registry.dispatch(&event("db2"));
        // give the worker a moment to drain
        std::thread::sleep(std::time::Duration::from_millis(50));
        let counters = registry.counters();
        assert_eq!(counters[0].1.published, 1);
        registry.shutdown();
    }

    #[test]
    fn unknown_sink_kind_is_skipped_without_panicking() {
        let registry = SinkRegistry::load(&[entry("carrier-pigeon", &[], 16)]);
        assert!(registry.counters().is_empty());
        registry.shutdown();
    }

    #[test]
    fn inactive_sink_is_not_started() {
        let mut e = entry("null", &[], 16);
        e.plugin.active = false;
        let registry = SinkRegistry::load(&[e]);
        assert!(registry.counters().is_empty());
        registry.shutdown();
    }
}
