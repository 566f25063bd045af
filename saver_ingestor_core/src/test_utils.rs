use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    event::Event,
    repository::{Repository, RepositoryError},
};

/// Creates an event whose payload is `data<id>`.
pub fn event(id: &str, group_id: &str) -> Event {
    Event {
        id: id.to_string(),
        group_id: group_id.to_string(),
        data: Bytes::from(format!("data{id}")),
    }
}

/// Repository that records every batch it receives.
///
/// Optionally sleeps inside each write and tracks how many writes overlap.
#[derive(Debug, Default)]
pub struct RecordingRepository {
    batches: Mutex<Vec<Vec<Event>>>,
    delay: Option<Duration>,
    fail: bool,
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

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Default::default()
        })
    }

    pub fn batches(&self) -> Vec<Vec<Event>> {
        self.batches.lock().unwrap().clone()
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

        if self.fail {
            return Err(RepositoryError::Storage {
                message: "injected failure".to_string(),
                source: Arc::new(std::io::Error::other("connection reset")),
            });
        }

        Ok(())
    }
}
