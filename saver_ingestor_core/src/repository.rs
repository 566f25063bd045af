use std::{error::Error, sync::Arc};

use async_trait::async_trait;
use snafu::Snafu;

use crate::event::Event;

/// Errors returned by a [`Repository`] write.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum RepositoryError {
    /// The underlying store rejected or failed the write.
    #[snafu(display("storage error: {message}"))]
    Storage {
        message: String,
        source: Arc<dyn Error + Send + Sync>,
    },
}

/// Durable storage for events.
///
/// Implementations must be idempotent on [`Event::id`]: saving an event whose
/// id is already stored is a silent no-op, neither an error nor a duplicate.
/// The ingestor never retries, but an operator may replay overlapping data.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
    /// Saves a non-empty, ordered batch of events belonging to one group.
    async fn save_batch(&self, events: &[Event]) -> Result<(), RepositoryError>;
}
