use std::net::AddrParseError;

use snafu::Snafu;

/// CLI error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum CliError {
    #[snafu(display("Invalid {name} argument: {message}"))]
    InvalidArgument { name: &'static str, message: String },
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },
    #[snafu(display("Invalid server URL"))]
    InvalidServerUrl { source: AddrParseError },
    #[snafu(display("Failed to initialize observability"))]
    Observability {
        source: saver_observability::ObservabilityError,
    },
    #[snafu(display("Storage error"))]
    Storage {
        source: saver_storage::StorageError,
    },
    #[snafu(display("Ingestor error"))]
    Ingestor {
        source: saver_ingestor_core::IngestorError,
    },
    #[snafu(display("Push client error"))]
    PushClient {
        source: saver_push_client::HttpPushClientError,
    },
}

pub type Result<T, E = CliError> = std::result::Result<T, E>;
