use thiserror::Error;

/// Errors that can occur in the HTTP ingestor.
#[derive(Error, Debug)]
pub enum HttpIngestorError {
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("ingestor unavailable: {message}")]
    Unavailable { message: String },
}

pub type Result<T, E = HttpIngestorError> = std::result::Result<T, E>;
