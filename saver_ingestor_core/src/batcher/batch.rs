use std::{fmt, sync::Arc};

use saver_observability::KeyValue;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{event::Event, options::BatchOptions, writer_pool::WriterPool};

use super::metrics::BatcherMetrics;

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The batch reached its maximum size.
    Size,
    /// No event arrived for the idle timeout.
    Timeout,
    /// The ingestor is shutting down.
    Shutdown,
}

/// Sent by a batch to the batcher once it stopped accepting events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retired {
    pub group_id: String,
    pub batch_id: u64,
}

/// The batcher's side of a live batch.
pub struct BatchHandle {
    pub batch_id: u64,
    pub tx: mpsc::Sender<Event>,
    /// Events forwarded to this batch so far.
    pub routed: usize,
}

/// Worker that accumulates the events of one group and flushes them once.
pub struct BatchWorker {
    group_id: String,
    batch_id: u64,
    options: BatchOptions,
    rx: mpsc::Receiver<Event>,
    buffer: Vec<Event>,
    retired_tx: mpsc::UnboundedSender<Retired>,
    writer: WriterPool,
    metrics: Arc<BatcherMetrics>,
}

impl BatchWorker {
    pub fn new(
        group_id: String,
        batch_id: u64,
        options: BatchOptions,
        rx: mpsc::Receiver<Event>,
        retired_tx: mpsc::UnboundedSender<Retired>,
        writer: WriterPool,
        metrics: Arc<BatcherMetrics>,
    ) -> Self {
        Self {
            group_id,
            batch_id,
            options,
            rx,
            buffer: Vec::with_capacity(options.max_size.get()),
            retired_tx,
            writer,
            metrics,
        }
    }

    /// Runs the batch until it flushes.
    pub async fn run(mut self, ct: CancellationToken) {
        let metrics = self.metrics.clone();
        metrics.active_batches.add(1, &[]);

        let reason = self.accumulate(&ct).await;
        self.retire().await;
        self.flush(reason).await;

        metrics.active_batches.add(-1, &[]);
    }

    async fn accumulate(&mut self, ct: &CancellationToken) -> FlushReason {
        let flush_timeout = self.options.flush_timeout;
        let max_size = self.options.max_size.get();

        let idle = tokio::time::sleep(flush_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                event = self.rx.recv() => {
                    // The batcher dropped its handle: it is shutting down.
                    let Some(event) = event else {
                        return FlushReason::Shutdown;
                    };

                    self.buffer.push(event);
                    if self.buffer.len() >= max_size {
                        return FlushReason::Size;
                    }

                    idle.as_mut().reset(Instant::now() + flush_timeout);
                }
                _ = &mut idle => {
                    return FlushReason::Timeout;
                }
                _ = ct.cancelled() => {
                    return FlushReason::Shutdown;
                }
            }
        }
    }

    /// Stops accepting events and tells the batcher to forget this batch.
    ///
    /// Events already queued in the input were routed here before the input
    /// closed, so they are part of this batch. The batcher never routes more
    /// than `max_size` events to one batch, so the buffer stays within bounds.
    ///
    /// `recv` only returns `None` once every send that reserved capacity
    /// before the close has delivered its event.
    async fn retire(&mut self) {
        self.rx.close();
        while let Some(event) = self.rx.recv().await {
            self.buffer.push(event);
        }

        // The batcher is gone during shutdown, nothing left to deregister from.
        let _ = self.retired_tx.send(Retired {
            group_id: self.group_id.clone(),
            batch_id: self.batch_id,
        });
    }

    async fn flush(self, reason: FlushReason) {
        let size = self.buffer.len();
        if size == 0 {
            trace!(
                group_id = %self.group_id,
                batch_id = self.batch_id,
                %reason,
                "nothing to flush"
            );
            return;
        }

        debug!(
            group_id = %self.group_id,
            batch_id = self.batch_id,
            %reason,
            size,
            "flushing batch"
        );

        let attributes = [KeyValue::new("reason", reason.as_str())];
        self.metrics.flushed_batches.add(1, &attributes);
        self.metrics.flushed_events.add(size as u64, &attributes);

        self.writer.dispatch(self.buffer).await;
    }
}

impl FlushReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushReason::Size => "size",
            FlushReason::Timeout => "timeout",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
