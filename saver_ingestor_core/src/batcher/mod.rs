//! Routes events to per-group batches.
//!
//! The [`Batcher`] is a single task that owns the registry of live batches.
//! Batches never touch the registry: when they stop accepting events they
//! close their input and send a [`Retired`] message back, and the batcher
//! drops the entry if it still points to that batch.
use std::{
    collections::{HashMap, hash_map::Entry},
    sync::Arc,
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, trace};

use crate::{event::Event, options::BatchOptions, writer_pool::WriterPool};

use self::{
    batch::{BatchHandle, BatchWorker},
    metrics::BatcherMetrics,
};

pub use self::batch::{FlushReason, Retired};

mod batch;
mod metrics;

pub struct Batcher {
    registry: BatchRegistry,
    retired_rx: mpsc::UnboundedReceiver<Retired>,
}

/// Live batches by group id, plus what is needed to spawn new ones.
struct BatchRegistry {
    options: BatchOptions,
    writer: WriterPool,
    tracker: TaskTracker,
    batches: HashMap<String, BatchHandle>,
    next_batch_id: u64,
    retired_tx: mpsc::UnboundedSender<Retired>,
    metrics: Arc<BatcherMetrics>,
}

impl Batcher {
    /// Creates a new batcher. Batches are spawned on `tracker` and flush into `writer`.
    pub fn new(options: BatchOptions, writer: WriterPool, tracker: TaskTracker) -> Self {
        let (retired_tx, retired_rx) = mpsc::unbounded_channel();

        let registry = BatchRegistry {
            options,
            writer,
            tracker,
            batches: HashMap::new(),
            next_batch_id: 0,
            retired_tx,
            metrics: Default::default(),
        };

        Self {
            registry,
            retired_rx,
        }
    }

    /// Routes events until `ct` is cancelled or every sender of `events` is dropped.
    ///
    /// On cancellation the input is closed and the events already queued in it
    /// are still routed, so they flush with the rest. Returning drops every
    /// batch handle, which makes the live batches flush. It does not wait for
    /// them.
    pub async fn run(self, mut events: mpsc::Receiver<Event>, ct: CancellationToken) {
        let Self {
            mut registry,
            mut retired_rx,
        } = self;

        loop {
            tokio::select! {
                biased;
                _ = ct.cancelled() => {
                    events.close();

                    let mut drained = 0;
                    while let Some(event) = events.recv().await {
                        registry.route(event, &ct);
                        drained += 1;
                    }

                    debug!(drained, "batcher cancelled");
                    break;
                }
                Some(retired) = retired_rx.recv() => {
                    registry.remove_retired(retired);
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("batcher input closed");
                        break;
                    };

                    registry.route(event, &ct);
                }
            }
        }

        debug!(live_batches = registry.len(), "batcher stopped");
    }
}

impl BatchRegistry {
    /// Forwards the event to its group's batch, creating the batch if needed.
    ///
    /// Never waits: a batch input has room for `max_size` events and at most
    /// `max_size` events are routed to a batch.
    fn route(&mut self, event: Event, ct: &CancellationToken) {
        trace!(event_id = %event.id, group_id = %event.group_id, "routing event");

        let max_size = self.options.max_size.get();
        let group_id = event.group_id.clone();

        let event = match self.batches.entry(group_id) {
            Entry::Occupied(mut entry) => match entry.get().tx.try_send(event) {
                Ok(()) => {
                    let handle = entry.get_mut();
                    handle.routed += 1;
                    if handle.routed >= max_size {
                        // The batch flushes by size as soon as it reads this event.
                        entry.remove();
                    }
                    return;
                }
                Err(TrySendError::Closed(event)) | Err(TrySendError::Full(event)) => {
                    trace!(
                        group_id = %event.group_id,
                        batch_id = entry.get().batch_id,
                        "batch retired before routing"
                    );
                    entry.remove();
                    event
                }
            },
            Entry::Vacant(_) => event,
        };

        let group_id = event.group_id.clone();
        let mut handle = self.spawn_batch(group_id.clone(), ct);

        if let Err(err) = handle.tx.try_send(event) {
            // A fresh input is open and empty.
            error!(%group_id, error = %err, "failed to route event to new batch");
            return;
        }

        handle.routed = 1;
        if handle.routed < max_size {
            self.batches.insert(group_id, handle);
        }
    }

    fn spawn_batch(&mut self, group_id: String, ct: &CancellationToken) -> BatchHandle {
        let batch_id = self.next_batch_id;
        self.next_batch_id += 1;

        trace!(%group_id, batch_id, "creating batch");

        let (tx, rx) = mpsc::channel(self.options.max_size.get());
        let worker = BatchWorker::new(
            group_id,
            batch_id,
            self.options,
            rx,
            self.retired_tx.clone(),
            self.writer.clone(),
            self.metrics.clone(),
        );

        self.tracker.spawn(worker.run(ct.clone()));

        BatchHandle {
            batch_id,
            tx,
            routed: 0,
        }
    }

    fn remove_retired(&mut self, retired: Retired) {
        if let Entry::Occupied(entry) = self.batches.entry(retired.group_id) {
            // A newer batch for the same group stays registered.
            if entry.get().batch_id == retired.batch_id {
                entry.remove();
            }
        }
    }

    fn len(&self) -> usize {
        self.batches.len()
    }
}
