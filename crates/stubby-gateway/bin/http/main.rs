mod cli;

use crate::cli::{LogFormat, StorageBackendArg, CLI};
use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use stubby_core::Repository;
use stubby_gateway::{App, AppState};
use stubby_session::SessionCodec;
use stubby_shortener::{DeletionDaemon, ShortenerConfig, ShortenerService};
use stubby_storage::{InMemoryRepository, PostgresRepository};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    init_tracing(config.log_format);

    let storage_backend = config.storage_backend();
    info!(
        listen_addr = %config.listen_addr(),
        base_url = %config.base_url(),
        storage_backend = %storage_backend,
        "starting stubby"
    );

    match storage_backend {
        StorageBackendArg::InMemory => run_server(config, InMemoryRepository::new()).await,
        StorageBackendArg::Postgres => {
            let database_dsn = config
                .database_dsn
                .as_deref()
                .context("database dsn is required when storage backend is postgres")?;
            let repository = PostgresRepository::connect(database_dsn).await?;
            repository.create_schema().await?;
            run_server(config, repository).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn run_server<R: Repository>(config: CLI, repository: R) -> anyhow::Result<()> {
    let repository = Arc::new(repository);
    let sessions = SessionCodec::new(config.secret_key.as_bytes())?;

    let (mut daemon, deletions) =
        DeletionDaemon::new(Arc::clone(&repository), config.deletion_config());
    let shortener = ShortenerService::new(
        repository,
        sessions,
        deletions,
        ShortenerConfig::builder().base_url(config.base_url()).build(),
    );

    let shutdown = CancellationToken::new();
    let daemon_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { daemon.run(shutdown).await }
    });

    let app = App::router(AppState::new(Arc::new(shortener)));
    let listener = TcpListener::bind(config.listen_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr()))?;
    info!(listen_addr = %listener.local_addr()?, "serving http");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    daemon_handle.await?;
    info!("stubby stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
