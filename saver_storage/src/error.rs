use snafu::Snafu;

/// Errors raised while setting up storage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    #[snafu(display("failed to connect to postgres at {address}"))]
    Connect {
        address: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to run database migrations"))]
    Migrate {
        source: sqlx::migrate::MigrateError,
    },
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
