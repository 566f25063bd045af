use std::{num::NonZeroUsize, time::Duration};

use crate::error::{InvalidOptionsSnafu, Result};

const DEFAULT_MAX_SIZE: NonZeroUsize = NonZeroUsize::new(3).expect("non-zero");
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_MAX_CONCURRENT_WRITES: NonZeroUsize = NonZeroUsize::new(5).expect("non-zero");
const DEFAULT_INPUT_CAPACITY: NonZeroUsize = NonZeroUsize::new(64).expect("non-zero");

/// Flush policy applied to every group's batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Number of events after which a batch is flushed.
    pub max_size: NonZeroUsize,
    /// Idle time after the last accepted event after which a batch is flushed.
    pub flush_timeout: Duration,
}

/// Options for the batch ingestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestorOptions {
    /// Per-group flush policy.
    pub batch: BatchOptions,
    /// Upper bound on concurrent repository writes across all groups.
    pub max_concurrent_writes: NonZeroUsize,
    /// Capacity of the channel between clients and the batcher.
    pub input_capacity: NonZeroUsize,
}

impl BatchOptions {
    pub fn new(max_size: NonZeroUsize, flush_timeout: Duration) -> Self {
        Self {
            max_size,
            flush_timeout,
        }
    }

    /// Change the number of events that triggers a flush.
    pub fn with_max_size(mut self, max_size: NonZeroUsize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Change the idle flush timeout.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.flush_timeout.is_zero() {
            return InvalidOptionsSnafu {
                message: "batch flush timeout must be positive",
            }
            .fail();
        }

        Ok(())
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_FLUSH_TIMEOUT)
    }
}

impl IngestorOptions {
    /// Change the per-group flush policy.
    pub fn with_batch(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    /// Change the maximum number of concurrent writes.
    pub fn with_max_concurrent_writes(mut self, max_concurrent_writes: NonZeroUsize) -> Self {
        self.max_concurrent_writes = max_concurrent_writes;
        self
    }

    /// Change the capacity of the ingestor input channel.
    pub fn with_input_capacity(mut self, input_capacity: NonZeroUsize) -> Self {
        self.input_capacity = input_capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.batch.validate()
    }
}

impl Default for IngestorOptions {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            max_concurrent_writes: DEFAULT_MAX_CONCURRENT_WRITES,
            input_capacity: DEFAULT_INPUT_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestorError;

    #[test]
    fn test_default_options() {
        let options = IngestorOptions::default();
        assert_eq!(options.batch.max_size.get(), 3);
        assert_eq!(options.batch.flush_timeout, Duration::from_secs(1));
        assert_eq!(options.max_concurrent_writes.get(), 5);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_reject_zero_flush_timeout() {
        let options = IngestorOptions::default()
            .with_batch(BatchOptions::default().with_flush_timeout(Duration::ZERO));
        let err = options.validate().unwrap_err();
        assert!(matches!(err, IngestorError::InvalidOptions { .. }));
    }
}
