//! Provisioner Coordinator - Main Entry Point
//! JSON-RPC server in front of the job acquirer

mod config;

use anyhow::{Context, Result};
use config::{DaemonConfig, LogFormat};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use provisionerd_api_rpc::{RpcServer, RpcServerConfig};
use provisionerd_core::application::{Acquirer, AcquirerConfig, JobPostingService};
use provisionerd_core::port::id_provider::UuidProvider;
use provisionerd_core::port::time_provider::SystemTimeProvider;
use provisionerd_infra_memory::InMemoryPubsub;
use provisionerd_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let config = DaemonConfig::from_env()?;

    // 2. Initialize logging
    init_logging(config.log_format)?;

    info!("Provisioner coordinator v{} starting...", VERSION);

    // 3. Initialize database
    if let Some(dir) = Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating database directory {}", dir.display()))?;
    }
    info!(db_path = %config.db_path, "Initializing database...");

    let pool = create_pool(&config.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let shutdown = CancellationToken::new();
    let time_provider = Arc::new(SystemTimeProvider);
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let pubsub = Arc::new(InMemoryPubsub::new());

    let acquirer = Acquirer::new(
        shutdown.child_token(),
        store.clone(),
        pubsub.clone(),
        time_provider.clone(),
        AcquirerConfig {
            backup_poll_interval: config.backup_poll_interval,
            ..Default::default()
        },
    )
    .await;

    let posting = Arc::new(JobPostingService::new(
        store,
        pubsub.clone(),
        Arc::new(UuidProvider),
        time_provider,
    ));

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
        acquire_long_poll: config.acquire_long_poll,
    };
    let (rpc_handle, addr) = RpcServer::new(rpc_config, acquirer, posting, shutdown.child_token())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(%addr, "System ready. Waiting for provisioner daemons...");

    // 6. Wait for shutdown signal
    wait_for_shutdown().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: wake long polls, stop backup polls, then the server
    shutdown.cancel();
    pubsub.close();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;
    pool.close().await;

    info!("Shutdown complete.");

    Ok(())
}

fn init_logging(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("provisionerd=info"))
        .context("Failed to create env filter")?;

    match format {
        LogFormat::Json => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
