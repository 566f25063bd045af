pub mod batcher;
pub mod error;
pub mod event;
pub mod ingestor;
pub mod options;
pub mod repository;
pub mod writer_pool;

#[cfg(test)]
pub mod test_utils;

pub use batcher::FlushReason;
pub use error::{IngestorError, Result};
pub use event::Event;
pub use ingestor::{BatchIngestor, BatchIngestorClient, run_background_ingestor};
pub use options::{BatchOptions, IngestorOptions};
pub use repository::{Repository, RepositoryError};
pub use writer_pool::WriterPool;
