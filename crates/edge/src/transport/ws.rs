// SPDX-License-Identifier: MIT

//! Worker-side WebSocket transport (§4.4 WS handshake, §4.5 liveness,
//! §4.6/§4.8 response and cancel routing).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bridge_proto::{Envelope, MessageTag};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::auth::{validate_worker_auth, AuthOutcome};
use crate::pending::Failure;
use crate::registry::WorkerRecord;
use crate::state::EdgeState;

/// `GET /ws` (configurable path) — Worker connection upgrade.
pub async fn ws_handler(State(state): State<Arc<EdgeState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_connection(socket, state))
}

async fn handle_worker_connection(socket: WebSocket, state: Arc<EdgeState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut outbox) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let Some(record) = authenticate(&mut ws_rx, &tx, &state).await else {
        drop(tx);
        let _ = writer.await;
        return;
    };

    tracing::info!(client_id = %record.client_id, "worker authenticated");

    loop {
        tokio::select! {
            _ = record.cancel.cancelled() => break,
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        dispatch_inbound(&state, &record, &text.to_string()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        record.mark_alive(true);
                        record.touch_pong().await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %record.client_id, err = %e, "worker ws error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // Only clean up if this connection still owns the registry slot — a
    // replaced connection's old loop must not evict the new one (§3).
    if let Some(current) = state.registry.get(&record.client_id).await {
        if Arc::ptr_eq(&current, &record) {
            state.registry.remove(&record.client_id).await;
            state.pending.fail_all_for_worker(&record.client_id).await;
        }
    }

    drop(tx);
    let _ = writer.await;
}

/// Run the §4.4 handshake: the first frame must be `auth`.
async fn authenticate(
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<Message>,
    state: &Arc<EdgeState>,
) -> Option<Arc<WorkerRecord>> {
    let first = ws_rx.next().await;
    let text = match first {
        Some(Ok(Message::Text(text))) => text.to_string(),
        _ => {
            let _ = tx.send(Message::Text(Envelope::error(None, "Authentication required").encode().into()));
            let _ = tx.send(close_frame(1008, "Authentication failed"));
            return None;
        }
    };

    let env = match Envelope::decode(&text) {
        Ok(env) => env,
        Err(_) => {
            let _ = tx.send(Message::Text(Envelope::error(None, "Authentication required").encode().into()));
            let _ = tx.send(close_frame(1008, "Authentication failed"));
            return None;
        }
    };

    if env.tag != MessageTag::Auth {
        let _ = tx.send(Message::Text(Envelope::error(None, "Authentication required").encode().into()));
        let _ = tx.send(close_frame(1008, "Authentication failed"));
        return None;
    }

    let outcome = validate_worker_auth(
        &state.config.api_key,
        &state.config.jwt_secret,
        state.config.jwt_expires_in(),
        env.field_str("apiKey"),
        env.field_str("clientId"),
    );

    match outcome {
        AuthOutcome::InvalidApiKey => {
            let _ = tx.send(Message::Text(Envelope::auth_result_err("Invalid API key").encode().into()));
            let _ = tx.send(close_frame(1008, "Authentication failed"));
            None
        }
        AuthOutcome::MissingClientId => {
            let _ = tx.send(Message::Text(Envelope::auth_result_err("Client ID required").encode().into()));
            let _ = tx.send(close_frame(1008, "Authentication failed"));
            None
        }
        AuthOutcome::Ok { client_id, token } => {
            let record = state.registry.add(client_id, tx.clone()).await;
            let _ = tx.send(Message::Text(Envelope::auth_result_ok(token).encode().into()));
            Some(record)
        }
    }
}

fn close_frame(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(axum::extract::ws::CloseFrame { code, reason: reason.into() }))
}

/// Route one inbound frame from an already-authenticated Worker.
async fn dispatch_inbound(state: &Arc<EdgeState>, record: &Arc<WorkerRecord>, text: &str) {
    let env = match Envelope::decode(text) {
        Ok(env) => env,
        Err(err) => {
            record.send_text(Envelope::from(err).encode());
            return;
        }
    };

    match env.tag {
        MessageTag::Ping => record.send_text(Envelope::pong().encode()),
        MessageTag::Pong => {
            record.mark_alive(true);
            record.touch_pong().await;
        }
        MessageTag::ChatResponse
        | MessageTag::CompletionResponse
        | MessageTag::EmbeddingsResponse
        | MessageTag::ModelsResponse => {
            if let Some(id) = env.request_id.clone() {
                let data = env.field("data").cloned().unwrap_or(serde_json::Value::Null);
                state.pending.resolve(&id, data).await;
            } else {
                tracing::warn!("response frame without requestId dropped");
            }
        }
        MessageTag::StreamChunk => {
            if let Some(id) = env.request_id.clone() {
                let data = env.field("data").cloned().unwrap_or(serde_json::Value::Null);
                state.pending.feed_chunk(&id, data).await;
            }
        }
        MessageTag::StreamEnd => {
            if let Some(id) = env.request_id.clone() {
                state.pending.finish_stream(&id).await;
            }
        }
        MessageTag::Error | MessageTag::ErrorResponse => {
            if let Some(id) = env.request_id.clone() {
                let msg = env.field_str("error").unwrap_or("unknown upstream error").to_owned();
                state.pending.fail(&id, Failure::Upstream(msg)).await;
            }
        }
        // Auth/requests are not expected from a Worker once serving; ignore.
        _ => {}
    }
}
