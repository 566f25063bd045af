//! Repository implementations for the batch ingestor.
mod error;
mod memory;
mod options;
mod postgres;

pub use self::{
    error::{Result, StorageError},
    memory::InMemoryRepository,
    options::PostgresOptions,
    postgres::PostgresRepository,
};
