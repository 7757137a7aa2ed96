//! Service entrypoint: boots the FDB network thread, connects the Redis
//! semaphore backend, spawns the janitor's background sweeps, and serves the
//! axum router. Structure mirrors `packages/server/src/server/main.rs`:
//! `tracing_subscriber` init, `Config::from_env`, connect dependencies, build
//! the app, serve.

mod app;
mod config;
mod error;
mod janitor_loop;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use queue_core::fdb_backend::FdbBackend;
use queue_core::QueueCore;
use tenant_semaphore::redis_backend::RedisSemaphoreBackend;
use tenant_semaphore::TenantSemaphore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::app::{build_app, AppState};
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,queue_service=debug,queue_core=debug,tenant_semaphore=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting queue service");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(bind_addr = %config.service_bind_addr, single_tenant = config.single_tenant, "configuration loaded");

    // Safety: `boot()` must be called exactly once per process and the guard
    // kept alive for the process lifetime; it is never called again here.
    let _fdb_network = unsafe { foundationdb::boot() };

    let db = foundationdb::Database::new(config.fdb_cluster_file.as_deref())
        .context("failed to open FDB cluster")?;
    let queue = QueueCore::new(Arc::new(FdbBackend::new(Arc::new(db))));
    tracing::info!("connected to FoundationDB");

    let semaphore_backend = RedisSemaphoreBackend::connect(&config.redis_url, config.semaphore_key_prefix.clone())
        .await
        .context("failed to connect to redis")?;
    let semaphore = if config.single_tenant {
        TenantSemaphore::bypassed(Arc::new(semaphore_backend))
    } else {
        TenantSemaphore::new(Arc::new(semaphore_backend))
    };
    tracing::info!("connected to redis");

    let config = Arc::new(config);
    let state = AppState {
        queue: queue.clone(),
        semaphore,
        config: config.clone(),
    };

    let shutdown = CancellationToken::new();
    janitor_loop::spawn(queue, config.janitor.clone(), shutdown.clone());

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(config.service_bind_addr)
        .await
        .context("failed to bind service address")?;

    tracing::info!(addr = %config.service_bind_addr, "serving queue service");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}
