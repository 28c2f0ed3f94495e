// SPDX-License-Identifier: MIT

//! The Worker process: holds one outbound connection to an Edge and
//! bridges it to a local OpenAI-compatible inference runtime.

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod reconnect;
pub mod status;
pub mod upstream;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use config::WorkerConfig;
use status::WorkerStatus;
use upstream::UpstreamClient;

/// Run the reconnect loop and the local health server until `shutdown`
/// fires or one of them exits with a fatal error.
pub async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let upstream = Arc::new(UpstreamClient::new(config.lm_studio_base_url()));
    let status = WorkerStatus::new();
    let shutdown = CancellationToken::new();

    let health_port = config.health_check_port;
    let health_status = Arc::clone(&status);
    let health_task = tokio::spawn(async move { health::serve(health_port, health_status).await });

    let mut reconnect_task = tokio::spawn(reconnect::run(
        Arc::clone(&config),
        upstream,
        status,
        shutdown.clone(),
    ));

    tokio::select! {
        _ = wait_for_shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connection");
            shutdown.cancel();
            // §13: give the reconnect loop a grace period to notice the
            // cancellation and exit cleanly before forcing the issue.
            tokio::select! {
                result = &mut reconnect_task => {
                    if let Err(err) = result {
                        tracing::error!(err = %err, "reconnect loop task panicked during shutdown");
                    }
                }
                _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {
                    tracing::warn!("graceful shutdown grace period elapsed, forcing exit");
                    reconnect_task.abort();
                }
            }
        }
        result = &mut reconnect_task => {
            if let Err(err) = result {
                tracing::error!(err = %err, "reconnect loop task panicked");
            }
        }
    }

    health_task.abort();
    Ok(())
}

async fn wait_for_shutdown_signal() {
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
    }
}
