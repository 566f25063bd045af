use std::{net::SocketAddr, num::NonZeroUsize, sync::Arc, time::Duration};

use clap::{ArgAction, Args, ValueEnum};
use saver_ingestor_core::{
    BatchIngestor, BatchIngestorClient, BatchOptions, IngestorOptions, Repository,
    run_background_ingestor,
};
use saver_ingestor_http::HttpIngestor;
use saver_storage::{InMemoryRepository, PostgresOptions, PostgresRepository};
use snafu::ResultExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{
    IngestorSnafu, InvalidServerUrlSnafu, IoSnafu, ObservabilitySnafu, Result, StorageSnafu,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Keep events in memory. Everything is lost on exit.
    Memory,
    /// Save events to postgres.
    Postgres,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// The address of the HTTP ingestor server.
    #[arg(long, env = "APP_HTTP_ADDRESS", default_value = "0.0.0.0:3000")]
    http_address: String,
    /// Maximum number of batches written to storage at the same time.
    #[arg(long, env = "APP_MAX_CONCURRENT_WRITES", default_value = "5")]
    max_concurrent_writes: NonZeroUsize,
    /// Number of events that triggers a flush of a group's batch.
    #[arg(long, env = "APP_BATCH_MAX_SIZE", default_value = "3")]
    batch_max_size: NonZeroUsize,
    /// Flush a group's batch after this many milliseconds without new events.
    #[arg(long, env = "APP_BATCH_FLUSH_TIMEOUT_MS", default_value = "1000")]
    batch_flush_timeout_ms: u64,
    /// Number of events buffered between the HTTP server and the batcher.
    #[arg(long, env = "APP_INPUT_CAPACITY", default_value = "64")]
    input_capacity: NonZeroUsize,
    /// Where events are saved.
    #[arg(long, env = "APP_STORAGE", value_enum, default_value = "postgres")]
    storage: StorageKind,
    #[clap(flatten)]
    postgres: PostgresArgs,
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "APP_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

/// Postgres connection arguments, used with `--storage postgres`.
#[derive(Debug, Args)]
pub struct PostgresArgs {
    #[arg(long = "postgres-host", env = "APP_POSTGRES_HOST", default_value = "localhost")]
    host: String,
    #[arg(long = "postgres-port", env = "APP_POSTGRES_PORT", default_value = "5432")]
    port: u16,
    #[arg(long = "postgres-db-name", env = "APP_POSTGRES_DB_NAME", default_value = "events")]
    db_name: String,
    #[arg(long = "postgres-username", env = "APP_POSTGRES_USERNAME", default_value = "postgres")]
    username: String,
    #[arg(
        long = "postgres-pwd",
        env = "APP_POSTGRES_PWD",
        default_value = "",
        hide_env_values = true
    )]
    password: String,
    /// Connect to postgres over TLS.
    #[arg(
        long = "postgres-ssl",
        env = "APP_POSTGRES_SSL",
        action = ArgAction::Set,
        default_value = "false"
    )]
    ssl: bool,
    /// Size of the postgres connection pool.
    #[arg(
        long = "postgres-max-connections",
        env = "APP_POSTGRES_MAX_CONNECTIONS",
        default_value = "10"
    )]
    max_connections: u32,
}

impl ServeArgs {
    pub async fn run(self, ct: CancellationToken) -> Result<()> {
        saver_observability::init_observability(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            &self.log_level,
        )
        .context(ObservabilitySnafu {})?;

        let http_address = self
            .http_address
            .parse::<SocketAddr>()
            .context(InvalidServerUrlSnafu {})?;

        let options = self.ingestor_options();
        let repository = self.repository().await?;
        let ingestor = BatchIngestor::new(repository, options).context(IngestorSnafu {})?;

        let listener = TcpListener::bind(&http_address)
            .await
            .context(IoSnafu {})?;

        info!(
            %http_address,
            storage = ?self.storage,
            max_size = options.batch.max_size.get(),
            flush_timeout = ?options.batch.flush_timeout,
            max_concurrent_writes = options.max_concurrent_writes.get(),
            "starting saver"
        );

        run_service(listener, ingestor, ct).await?;

        info!("saver stopped");

        Ok(())
    }

    fn ingestor_options(&self) -> IngestorOptions {
        let batch = BatchOptions::new(
            self.batch_max_size,
            Duration::from_millis(self.batch_flush_timeout_ms),
        );

        IngestorOptions::default()
            .with_batch(batch)
            .with_max_concurrent_writes(self.max_concurrent_writes)
            .with_input_capacity(self.input_capacity)
    }

    async fn repository(&self) -> Result<Arc<dyn Repository>> {
        match self.storage {
            StorageKind::Memory => Ok(Arc::new(InMemoryRepository::new())),
            StorageKind::Postgres => {
                let repository = PostgresRepository::connect(&self.postgres.options())
                    .await
                    .context(StorageSnafu {})?;
                Ok(Arc::new(repository))
            }
        }
    }
}

impl PostgresArgs {
    fn options(&self) -> PostgresOptions {
        PostgresOptions::new(&self.host, self.port, &self.db_name)
            .with_credentials(&self.username, &self.password)
            .with_ssl(self.ssl)
            .with_max_connections(self.max_connections)
    }
}

/// Serves HTTP on `listener` until `ct` is cancelled, then stops the ingestor.
///
/// The ingestor has its own token and is only cancelled once the server has
/// shut down. By then every in-flight push has handed its events over, so all
/// events reported as accepted are flushed.
async fn run_service(
    listener: TcpListener,
    ingestor: BatchIngestor,
    ct: CancellationToken,
) -> Result<()> {
    let ingestor_ct = CancellationToken::new();

    // A failing server must still stop the ingestor so it can flush.
    let http_fut = {
        let client = ingestor.client();
        let ingestor_ct = ingestor_ct.clone();
        async move {
            let result = run_http_server(client, listener, ct).await;
            ingestor_ct.cancel();
            result
        }
    };

    let ingestor_fut = run_background_ingestor(ingestor, ingestor_ct);

    let (http_result, ingestor_result) = tokio::join!(http_fut, ingestor_fut);

    if let Err(err) = &http_result {
        warn!(error = %err, "HTTP server exited with error");
    }

    ingestor_result.context(IngestorSnafu {})?;
    http_result
}

/// Returns once every open connection has finished after `ct` is cancelled.
async fn run_http_server(
    batch_ingestor: BatchIngestorClient,
    listener: TcpListener,
    ct: CancellationToken,
) -> Result<()> {
    let app = HttpIngestor::new(batch_ingestor).into_router();

    if let Ok(address) = listener.local_addr() {
        info!(%address, "HTTP ingestor listening");
    }

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        ct.cancelled().await;
    });

    server.await.context(IoSnafu {})
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use saver_push_client::HttpPushClient;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[clap(flatten)]
        serve: ServeArgs,
    }

    #[test]
    fn test_default_args() {
        let cli = TestCli::try_parse_from(["saver"]).unwrap();
        let options = cli.serve.ingestor_options();

        assert_eq!(options.batch.max_size.get(), 3);
        assert_eq!(options.batch.flush_timeout, Duration::from_secs(1));
        assert_eq!(options.max_concurrent_writes.get(), 5);
        assert_eq!(options.input_capacity.get(), 64);
    }

    #[test]
    fn test_postgres_args() {
        let cli = TestCli::try_parse_from([
            "saver",
            "--postgres-host",
            "db",
            "--postgres-port",
            "5433",
            "--postgres-ssl",
            "true",
        ])
        .unwrap();
        let options = cli.serve.postgres.options();

        assert_eq!(options.address(), "db:5433/events");
        assert_eq!(options.username, "postgres");
        assert!(options.ssl);
    }

    #[test]
    fn test_reject_zero_batch_size() {
        assert!(TestCli::try_parse_from(["saver", "--batch-max-size", "0"]).is_err());
    }

    #[test]
    fn test_storage_kind() {
        let cli = TestCli::try_parse_from(["saver", "--storage", "memory"]).unwrap();
        assert_eq!(cli.serve.storage, StorageKind::Memory);
    }

    #[tokio::test]
    async fn test_accepted_events_are_saved_on_shutdown() {
        let repository = Arc::new(InMemoryRepository::new());
        let options = IngestorOptions::default()
            .with_batch(BatchOptions::new(
                NonZeroUsize::new(3).unwrap(),
                Duration::from_secs(60),
            ))
            .with_input_capacity(NonZeroUsize::new(1).unwrap());
        let ingestor = BatchIngestor::new(repository.clone(), options).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = HttpPushClient::new(format!("http://{}", listener.local_addr().unwrap()));

        let ct = CancellationToken::new();
        let service = tokio::spawn(run_service(listener, ingestor, ct.clone()));

        let mut request = client.push();
        for i in 0..500 {
            request = request.event(format!("event-{i}"), (i % 7).to_string(), b"data");
        }
        let push = tokio::spawn(request.send());

        tokio::time::sleep(Duration::from_millis(5)).await;
        ct.cancel();

        service.await.unwrap().unwrap();

        match push.await.unwrap() {
            Ok(response) => {
                assert_eq!(response.accepted, 500);
                assert_eq!(repository.len(), 500);
            }
            Err(_) => assert!(repository.is_empty()),
        }
    }
}
