//! Match Service
//!
//! Node process hosting authoritative match actors and relayed match routing.
//!
//! # Servers
//!
//! - HTTP server for health and metrics endpoints (default: 0.0.0.0:8082)
//!
//! This binary carries no client transport. A gateway embeds the library,
//! builds its own `MatchPipeline` over the registry and drains the
//! per-session queues of the `LocalMessageRouter`.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize tracing
//! 3. Initialize Prometheus metrics recorder
//! 4. Build tracker, router, logic modules and the match registry
//! 5. Start health HTTP server (liveness, readiness, metrics)
//! 6. Wait for shutdown signal, then stop the registry

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::Router;
use match_service::actors::{ActorMetrics, LocalMatchRegistry};
use match_service::config::{Config, LogFormat};
use match_service::logic::LogicModules;
use match_service::observability::{health_router, init_metrics_recorder, HealthState};
use match_service::router::LocalMessageRouter;
use match_service::tracker::LocalTracker;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    init_tracing(config.log_format);

    info!(
        node = %config.node,
        health_bind_address = %config.health_bind_address,
        mailbox_capacity = config.mailbox_capacity,
        session_queue_capacity = config.session_queue_capacity,
        max_players = ?config.max_players,
        "Configuration loaded successfully"
    );

    // Must happen before any metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| anyhow!(e))?;
    info!("Prometheus metrics recorder initialized");

    let tracker = Arc::new(LocalTracker::new(config.node.clone()));
    let router = Arc::new(LocalMessageRouter::new(
        config.node.clone(),
        config.session_queue_capacity,
    ));
    let modules = LogicModules::with_builtin(config.max_players);
    info!(modules = ?modules.names(), "Match logic modules loaded");

    let registry = LocalMatchRegistry::new(
        config.node.clone(),
        config.mailbox_capacity,
        modules,
        tracker,
        router,
        ActorMetrics::new(),
    );
    info!("Match registry initialized");

    let health_state = Arc::new(HealthState::new(
        config.node.clone(),
        Arc::clone(registry.metrics()),
    ));

    let shutdown_token = CancellationToken::new();

    let health_addr: SocketAddr = config
        .health_bind_address
        .parse()
        .with_context(|| format!("Invalid health bind address: {}", config.health_bind_address))?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let app = health_router(Arc::clone(&health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("Failed to bind health server to {health_addr}"))?;

    let health_shutdown_token = shutdown_token.child_token();
    let health_task = tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    health_state.set_ready();
    info!(node = %config.node, "Match service running - press Ctrl+C to shutdown");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so traffic drains away
    health_state.set_not_ready();

    registry.stop().await;

    shutdown_token.cancel();
    if let Err(e) = health_task.await {
        error!(error = %e, "Health server task failed");
    }

    info!("Match service shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "match_service=debug,tower_http=debug".into());

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the service
/// cannot shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
