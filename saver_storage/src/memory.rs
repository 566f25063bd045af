use async_trait::async_trait;
use dashmap::DashMap;
use saver_ingestor_core::{Event, Repository, RepositoryError};
use tracing::trace;

/// Repository that keeps events in memory, keyed by id.
///
/// The first event stored under an id wins, later saves of the same id are
/// ignored. Suitable for testing and development.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    events: DashMap<String, Event>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Event> {
        self.events.get(id).map(|event| event.value().clone())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_batch(&self, events: &[Event]) -> Result<(), RepositoryError> {
        let mut inserted = 0;
        for event in events {
            if let dashmap::Entry::Vacant(entry) = self.events.entry(event.id.clone()) {
                entry.insert(event.clone());
                inserted += 1;
            }
        }

        trace!(size = events.len(), inserted, "saved events in memory");

        Ok(())
    }
}
