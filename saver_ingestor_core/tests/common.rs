#![allow(dead_code)]

use std::{
    num::NonZeroUsize,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use saver_ingestor_core::{
    BatchIngestor, BatchIngestorClient, BatchOptions, Event, IngestorOptions, Repository,
    RepositoryError,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Repository that records the batches it is asked to save.
#[derive(Debug, Default)]
pub struct RecordingRepository {
    batches: Mutex<Vec<Vec<Event>>>,
    delay: Option<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl RecordingRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Default::default()
        })
    }

    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().unwrap().clone()
    }

    /// Recorded batches, ordered by the group id of their first event.
    pub fn batches_by_group(&self) -> Vec<Vec<Event>> {
        let mut batches = self.batches();
        batches.sort_by(|a, b| a[0].group_id.cmp(&b[0].group_id));
        batches
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Repository for RecordingRepository {
    async fn save_batch(&self, events: &[Event]) -> Result<(), RepositoryError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.batches.lock().unwrap().push(events.to_vec());
        self.active.fetch_sub(1, Ordering::SeqCst);

        Ok(())
    }
}

pub fn event(id: &str, group_id: &str) -> Event {
    Event::new(id, group_id, format!("data{id}")).expect("valid event")
}

pub fn ingestor_options(
    max_size: usize,
    flush_timeout: Duration,
    max_concurrent_writes: usize,
) -> IngestorOptions {
    IngestorOptions::default()
        .with_batch(BatchOptions::new(
            NonZeroUsize::new(max_size).unwrap(),
            flush_timeout,
        ))
        .with_max_concurrent_writes(NonZeroUsize::new(max_concurrent_writes).unwrap())
}

pub fn create_batch_ingestor(
    repository: Arc<RecordingRepository>,
    options: IngestorOptions,
) -> (JoinHandle<()>, BatchIngestorClient, CancellationToken) {
    let ingestor = BatchIngestor::new(repository, options).expect("valid options");

    let client = ingestor.client();
    let ct = CancellationToken::new();
    let task = tokio::spawn({
        let ct = ct.clone();
        async move {
            ingestor.run(ct).await.expect("ingestor run");
        }
    });

    (task, client, ct)
}

pub async fn shutdown(task: JoinHandle<()>, ct: CancellationToken) {
    ct.cancel();
    task.await.expect("ingestor task panicked");
}
