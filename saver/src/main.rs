use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::{error::Result, push::PushArgs, serve::ServeArgs};

mod error;
mod push;
mod serve;

#[derive(Parser)]
#[command(name = "saver")]
#[command(about = "Batch and save events by group")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the ingestion service
    Serve {
        #[clap(flatten)]
        inner: ServeArgs,
    },
    /// Push events to a running service
    Push {
        #[clap(flatten)]
        inner: PushArgs,
    },
}

#[tokio::main]
#[snafu::report]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ct = CancellationToken::new();

    tokio::spawn({
        let ct = ct.clone();
        async move {
            shutdown_signal().await;
            ct.cancel();
        }
    });

    match cli.command {
        Commands::Serve { inner } => inner.run(ct).await,
        Commands::Push { inner } => inner.run(ct).await,
    }
}

/// Resolves on ctrl-c or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
