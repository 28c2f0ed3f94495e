// SPDX-License-Identifier: MIT

//! Router assembly: wires the `/v1/*` HTTP surface, the Worker `/ws`
//! upgrade, and `/health` onto one `axum::Router<EdgeState>`.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::EdgeState;

pub fn build_router(state: Arc<EdgeState>) -> Router {
    let ws_path = state.config.ws_path.clone();

    Router::new()
        .route("/health", get(http::health))
        .route("/v1/chat/completions", post(http::chat_completions))
        .route("/v1/completions", post(http::completions))
        .route("/v1/embeddings", post(http::embeddings))
        .route("/v1/models", get(http::models))
        .route(&ws_path, get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
