// SPDX-License-Identifier: MIT

//! The Edge process: terminates public HTTP and the Worker WebSocket,
//! and correlates requests to responses across the bridge.

pub mod auth;
pub mod config;
pub mod error;
pub mod liveness;
pub mod models_cache;
pub mod pending;
pub mod registry;
pub mod state;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use config::EdgeConfig;
use state::EdgeState;

/// Bind, serve, and block until shutdown is requested.
pub async fn run(config: EdgeConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = EdgeState::new(config, shutdown.clone());

    liveness::spawn_liveness_supervisor(Arc::clone(&state));
    spawn_forced_exit_watcher(shutdown.clone());

    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "edge listening");

    let router = transport::build_router(Arc::clone(&state));

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown(shutdown))
        .await?;

    Ok(())
}

/// Resolves on SIGINT/SIGTERM (or an internally-triggered cancellation),
/// which tells `axum::serve` to stop accepting new connections and begin
/// draining the ones already open.
async fn wait_for_shutdown(shutdown: CancellationToken) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut sigterm) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            std::future::pending::<()>().await;
            unreachable!("pending future never resolves");
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => {}
    }

    tracing::info!("shutdown signal received, draining connections");
    shutdown.cancel();
}

/// §13: if connections haven't drained 5s after shutdown begins, force
/// the process down rather than hang indefinitely.
fn spawn_forced_exit_watcher(shutdown: CancellationToken) {
    tokio::spawn(async move {
        shutdown.cancelled().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::warn!("graceful shutdown grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
