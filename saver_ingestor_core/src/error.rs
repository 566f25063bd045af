use snafu::Snafu;

/// Ingestor error types.
///
/// Validation messages are forwarded to the client, for this reason they
/// should contain information that is useful to the user.
#[derive(Debug, Clone, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestorError {
    /// Validation error.
    ///
    /// The event does not satisfy the ingress invariants.
    #[snafu(display("validation error: {message}"))]
    Validation { message: String },
    /// The ingestor options are out of range.
    #[snafu(display("invalid options: {message}"))]
    InvalidOptions { message: String },
}

pub type Result<T, E = IngestorError> = std::result::Result<T, E>;
