//! Echidna Orchestrator
//!
//! HTTP service that accepts publication requests and drives each one
//! through its pipeline of checks and publication steps.
//!
//! Architecture:
//! - API: axum handlers for submissions, status polling and versions
//! - Services: the pipeline loop, the in-memory request registry,
//!   authentication and notification
//! - Steps: executors for the individual pipeline steps
//! - Repositories: uploaded archives and result files on disk

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod repository;
pub mod service;
pub mod steps;

use crate::api::AppState;
use crate::config::Config;
use crate::service::auth::StaticAuthenticator;
use crate::service::notifier::TracingNotifier;
use crate::service::registry::RequestRegistry;
use crate::service::request_service::RequestService;
use crate::steps::StepRegistry;

/// Upper bound between two registry sweeps
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How long cancelled pipelines get to persist their result on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "echidna_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Echidna Orchestrator...");

    let config = Arc::new(load_config()?);
    info!(
        "Loaded configuration: temp={}, results={}, steps={}",
        config.temp_location.display(),
        config.result_location.display(),
        config.steps_url.as_deref().unwrap_or("<skipped>")
    );

    tokio::fs::create_dir_all(&config.temp_location)
        .await
        .with_context(|| format!("Failed to create {}", config.temp_location.display()))?;
    tokio::fs::create_dir_all(&config.result_location)
        .await
        .with_context(|| format!("Failed to create {}", config.result_location.display()))?;

    let registry = Arc::new(RequestRegistry::new(config.registry_ttl));
    let sweeper = Arc::clone(&registry).spawn_sweeper(config.registry_ttl.min(MAX_SWEEP_INTERVAL));

    let shutdown = CancellationToken::new();
    let service = RequestService::new(
        Arc::clone(&config),
        registry,
        Arc::new(StepRegistry::from_config(&config)),
        Arc::new(TracingNotifier),
        shutdown.clone(),
    );

    let service = Arc::new(service);
    let state = AppState {
        service: Arc::clone(&service),
        authenticator: Arc::new(StaticAuthenticator::new(config.users.clone())),
    };

    // Build router with all API endpoints
    let app = api::create_router(state);

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown))
    .await
    .context("Server error")?;

    if !service.shutdown(SHUTDOWN_GRACE).await {
        tracing::warn!(
            "Some pipelines did not finish within {:?}, their results may be lost",
            SHUTDOWN_GRACE
        );
    }

    sweeper.abort();
    info!("Echidna Orchestrator stopped");
    Ok(())
}

/// Loads and validates configuration from environment variables
///
/// Unset variables take their defaults; a malformed one stops startup.
fn load_config() -> Result<Config> {
    let config = Config::from_env().context("Failed to load configuration from environment")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Resolves on Ctrl-C and cancels the running pipelines
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested, cancelling running pipelines");
    shutdown.cancel();
}
