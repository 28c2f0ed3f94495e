// SPDX-License-Identifier: MIT

//! Worker's local Health HTTP endpoint (§6): `GET /health` on
//! `HEALTH_CHECK_PORT`, independent of the Edge connection's own state.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::status::WorkerStatus;

pub async fn serve(port: u16, status: Arc<WorkerStatus>) -> anyhow::Result<()> {
    let router = Router::new().route("/health", get(health)).with_state(status);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "worker health endpoint listening");
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health(State(status): State<Arc<WorkerStatus>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "connected": status.connected(),
        "authenticated": status.authenticated(),
        "timestamp": now_ms(),
    }))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
