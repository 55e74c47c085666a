//! Warden daemon: drains the transactional outbox.
//!
//! Modes:
//! - `relay`: deliver PENDING rows to the configured channel
//! - `worker`: execute PENDING rows with the built-in local handlers
//! - `requeue`: return FAILED rows to PENDING

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_relay::{
    run_poller, BatchProcessor, ChannelConfig, DaemonConfig, DeliveryChannel, HandlerRegistry,
    LogChannel, OutboxRelay, OutboxWorker, StorageConfig, WebhookChannel,
};
use warden_storage::memory::InMemoryWardenStorage;
use warden_storage::sqlite::SqliteWardenStorage;
use warden_storage::OutboxStore;

/// Warden daemon CLI
#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "Warden daemon - transactional outbox relay and worker", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "WARDEN_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "WARDEN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "WARDEN_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish PENDING rows to the configured channel
    Relay,
    /// Execute PENDING rows with local handlers
    Worker,
    /// Return FAILED rows to PENDING
    Requeue {
        /// Outbox row ids
        #[arg(required = true, value_delimiter = ',')]
        ids: Vec<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = DaemonConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let store = open_store(&config.storage).await?;

    let processor: Box<dyn BatchProcessor> = match cli.command {
        Command::Requeue { ids } => {
            let requeued = store.requeue_failed(&ids).await?;
            info!(requested = ids.len(), requeued, "FAILED rows returned to PENDING");
            return Ok(());
        }
        Command::Relay => {
            let channel = open_channel(&config.channel)?;
            info!(channel = channel.name(), topic = %config.relay.topic(), "Starting relay");
            Box::new(OutboxRelay::new(store, channel, config.relay.clone()))
        }
        Command::Worker => {
            info!("Starting worker");
            Box::new(OutboxWorker::new(
                store,
                HandlerRegistry::with_defaults(),
                config.relay.clone(),
            ))
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run_poller(processor.as_ref(), &config.relay, shutdown_rx).await;
    info!("Shutdown complete");
    Ok(())
}

async fn open_store(storage: &StorageConfig) -> anyhow::Result<Arc<dyn OutboxStore>> {
    let store: Arc<dyn OutboxStore> = match storage {
        StorageConfig::Memory => {
            tracing::warn!("Using in-memory storage; no rows are shared with writers");
            Arc::new(InMemoryWardenStorage::new())
        }
        StorageConfig::Sqlite {
            url,
            max_connections,
            connect_timeout_secs,
        } => Arc::new(
            SqliteWardenStorage::connect_with_options(url, *max_connections, *connect_timeout_secs)
                .await
                .with_context(|| format!("failed to open {url}"))?,
        ),
    };
    Ok(store)
}

fn open_channel(channel: &ChannelConfig) -> anyhow::Result<Arc<dyn DeliveryChannel>> {
    let channel: Arc<dyn DeliveryChannel> = match channel {
        ChannelConfig::Log => Arc::new(LogChannel),
        ChannelConfig::Webhook { url, timeout_secs } => Arc::new(WebhookChannel::new(
            url.clone(),
            Duration::from_secs(*timeout_secs),
        )?),
    };
    Ok(channel)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
