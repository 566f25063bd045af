use std::{num::NonZeroUsize, sync::Arc};

use saver_observability::{Counter, KeyValue, UpDownCounter};
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

use crate::{event::Event, repository::Repository};

/// Dispatches flushed batches to the repository.
///
/// At most `max_concurrent_writes` writes are in flight at any time, no matter
/// how many groups flush together. Write results are logged and counted, never
/// returned to the caller.
#[derive(Clone)]
pub struct WriterPool {
    repository: Arc<dyn Repository>,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    metrics: Arc<WriterMetrics>,
}

struct WriterMetrics {
    writes: Counter<u64>,
    written_events: Counter<u64>,
    in_flight: UpDownCounter<i64>,
}

impl WriterPool {
    /// Creates a new pool. Writes are spawned on `tracker`.
    pub fn new(
        repository: Arc<dyn Repository>,
        max_concurrent_writes: NonZeroUsize,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            repository,
            permits: Arc::new(Semaphore::new(max_concurrent_writes.get())),
            tracker,
            metrics: Arc::new(WriterMetrics::default()),
        }
    }

    /// Starts writing `events` to the repository.
    ///
    /// Waits for a free write slot, then returns as soon as the write has been
    /// spawned. Empty batches are ignored.
    pub async fn dispatch(&self, events: Vec<Event>) {
        if events.is_empty() {
            return;
        }

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // The semaphore is owned by the pool and never closed.
                error!(size = events.len(), "writer pool closed, dropping batch");
                return;
            }
        };

        let repository = self.repository.clone();
        let metrics = self.metrics.clone();
        metrics.in_flight.add(1, &[]);

        self.tracker.spawn(async move {
            let size = events.len();
            let group_id = events[0].group_id.as_str();

            let status = match repository.save_batch(&events).await {
                Ok(()) => {
                    debug!(%group_id, size, "saved events");
                    metrics.written_events.add(size as u64, &[]);
                    "ok"
                }
                Err(err) => {
                    error!(error = %err, %group_id, size, "error saving events");
                    "error"
                }
            };

            metrics.writes.add(1, &[KeyValue::new("status", status)]);
            metrics.in_flight.add(-1, &[]);
            drop(permit);
        });
    }

    /// Number of writes that could start right now without waiting.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Default for WriterMetrics {
    fn default() -> Self {
        let meter = saver_observability::meter("writer");
        Self {
            writes: meter
                .u64_counter("saver.writer.writes")
                .with_unit("{write}")
                .with_description("repository writes, by status")
                .build(),
            written_events: meter
                .u64_counter("saver.writer.events")
                .with_unit("{event}")
                .with_description("events written to the repository")
                .build(),
            in_flight: meter
                .i64_up_down_counter("saver.writer.in_flight")
                .with_unit("{write}")
                .with_description("repository writes in progress")
                .build(),
        }
    }
}
