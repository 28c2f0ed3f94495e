// SPDX-License-Identifier: MIT

//! Routes one inbound request frame from the Edge to the Upstream Adapter
//! or the Stream Bridge, and tracks in-flight requests so `cancel_request`
//! (§4.8) has something to cancel.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_proto::{Envelope, MessageTag, RequestKind};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::bridge::bridge_stream;
use crate::config::WorkerConfig;
use crate::upstream::UpstreamClient;

/// Tracks the cancellation token for each `requestId` currently being
/// served, so a `cancel_request` frame can stop the right task (§4.8).
#[derive(Default)]
pub struct InFlight {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl InFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    async fn register(&self, id: String) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().await.insert(id, token.clone());
        token
    }

    async fn release(&self, id: &str) {
        self.tokens.lock().await.remove(id);
    }

    pub async fn cancel(&self, id: &str) {
        if let Some(token) = self.tokens.lock().await.remove(id) {
            token.cancel();
        }
    }
}

fn kind_for(tag: MessageTag) -> Option<RequestKind> {
    match tag {
        MessageTag::ChatRequest => Some(RequestKind::Chat),
        MessageTag::CompletionRequest => Some(RequestKind::Completion),
        MessageTag::EmbeddingsRequest => Some(RequestKind::Embeddings),
        MessageTag::ModelsRequest => Some(RequestKind::Models),
        _ => None,
    }
}

/// Handle one decoded inbound envelope. Spawns the actual upstream call so
/// the read loop stays free to notice a following `cancel_request`.
pub fn handle_request(
    env: Envelope,
    config: Arc<WorkerConfig>,
    upstream: Arc<UpstreamClient>,
    in_flight: Arc<InFlight>,
    outbound: mpsc::UnboundedSender<Message>,
) {
    let Some(kind) = kind_for(env.tag) else { return };
    let Some(request_id) = env.request_id.clone() else {
        tracing::warn!(tag = %env.tag, "request frame without requestId dropped");
        return;
    };
    let data = env.field("data").cloned().unwrap_or(Value::Null);
    let stream = env.field_bool("stream").unwrap_or(false);

    tokio::spawn(async move {
        let cancel = in_flight.register(request_id.clone()).await;

        if stream {
            let timeout = config.upstream_stream_timeout();
            bridge_stream(&upstream, kind, &data, &request_id, timeout, outbound, cancel).await;
        } else {
            let timeout = config.upstream_unary_timeout();
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = upstream.unary(kind, &data, timeout) => {
                    let frame = match result {
                        Ok(value) => Envelope::new(kind.response_tag())
                            .with_request_id(request_id.clone())
                            .with_value("data", value),
                        Err(err) => Envelope::error_response(request_id.clone(), err.to_string()),
                    };
                    let _ = outbound.send(Message::Text(frame.encode().into()));
                }
            }
        }

        in_flight.release(&request_id).await;
    });
}
