use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{error, info, warn};

use crate::{
    batcher::Batcher, error::Result, event::Event, options::IngestorOptions,
    repository::Repository, writer_pool::WriterPool,
};

/// Groups events into batches and writes them to the repository.
///
/// Build one with [`BatchIngestor::new`], hand out [`BatchIngestorClient`]s
/// with [`BatchIngestor::client`] and drive it with [`BatchIngestor::run`].
pub struct BatchIngestor {
    tx: mpsc::Sender<Event>,
    rx: mpsc::Receiver<Event>,
    batcher: Batcher,
    tracker: TaskTracker,
}

#[derive(Clone)]
pub struct BatchIngestorClient {
    tx: mpsc::Sender<Event>,
}

pub async fn run_background_ingestor(ingestor: BatchIngestor, ct: CancellationToken) -> Result<()> {
    ingestor.run(ct).await
}

impl BatchIngestor {
    pub fn new(repository: Arc<dyn Repository>, options: IngestorOptions) -> Result<Self> {
        options.validate()?;

        let (tx, rx) = mpsc::channel(options.input_capacity.get());
        let tracker = TaskTracker::new();
        let writer = WriterPool::new(repository, options.max_concurrent_writes, tracker.clone());
        let batcher = Batcher::new(options.batch, writer, tracker.clone());

        Ok(Self {
            tx,
            rx,
            batcher,
            tracker,
        })
    }

    pub fn client(&self) -> BatchIngestorClient {
        BatchIngestorClient {
            tx: self.tx.clone(),
        }
    }

    /// Runs the ingestor until `ct` is cancelled or every client is dropped.
    ///
    /// Returns only after every batch has been flushed and every write
    /// dispatched by the ingestor has completed.
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        let Self {
            tx,
            rx,
            batcher,
            tracker,
        } = self;

        // Only clients keep the input open.
        drop(tx);

        info!("batch ingestor started");

        let batcher_task = tracker.spawn(batcher.run(rx, ct));
        if let Err(err) = batcher_task.await {
            error!(error = %err, "batcher task failed");
        }

        tracker.close();
        info!(pending_tasks = tracker.len(), "waiting for batches to flush");
        tracker.wait().await;

        info!("batch ingestor stopped");

        Ok(())
    }
}

impl BatchIngestorClient {
    /// Forwards the event to the ingestor, waiting while its input is full.
    ///
    /// Write results are never reported back. Once the ingestor has stopped
    /// the event is dropped with a warning.
    pub async fn save(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event).await {
            warn!(
                event_id = %event.id,
                group_id = %event.group_id,
                "ingestor stopped, dropping event"
            );
        }
    }

    /// Returns true once the ingestor no longer accepts events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
