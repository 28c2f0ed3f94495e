// SPDX-License-Identifier: MIT

//! Edge HTTP surface (§4.6): the four `/v1/*` endpoints, unary dispatch,
//! and the SSE stream bridge.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bridge_proto::{Envelope, RequestKind};
use futures_util::Stream;
use serde_json::{json, Value};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt as _;

use crate::auth::validate_http_bearer;
use crate::error::EdgeError;
use crate::pending::{Failure, Outcome, StreamEvent};
use crate::registry::WorkerRecord;
use crate::state::{generate_request_id, EdgeState};

/// `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": now_ms() }))
}

/// `POST /v1/chat/completions`.
pub async fn chat_completions(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    dispatch(&state, &headers, RequestKind::Chat, body).await
}

/// `POST /v1/completions`.
pub async fn completions(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    dispatch(&state, &headers, RequestKind::Completion, body).await
}

/// `POST /v1/embeddings`.
pub async fn embeddings(
    State(state): State<Arc<EdgeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    dispatch(&state, &headers, RequestKind::Embeddings, body).await
}

/// `GET /v1/models`.
pub async fn models(State(state): State<Arc<EdgeState>>, headers: HeaderMap) -> Response {
    if let Err(err) = validate_http_bearer(&headers, &state.config.api_key, &state.config.jwt_secret) {
        return err.to_response("Invalid API key");
    }
    if let Some(cached) = state.models_cache.fresh().await {
        return Json(cached).into_response();
    }
    dispatch(&state, &headers, RequestKind::Models, Value::Null).await
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn no_worker_response(kind: RequestKind) -> Response {
    if matches!(kind, RequestKind::Models) {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "object": "list", "data": [], "message": "No LM Studio clients connected" })),
        )
            .into_response()
    } else {
        EdgeError::NoWorker.to_response("No available LM Studio clients")
    }
}

fn failure_response(failure: &Failure) -> Response {
    match failure {
        Failure::Timeout => EdgeError::Timeout.to_response(failure.message()),
        Failure::WorkerGone => EdgeError::WorkerGone.to_response(failure.message()),
        Failure::Upstream(_) => EdgeError::Upstream.to_response(failure.message()),
        Failure::Cancelled => EdgeError::Internal.to_response(failure.message()),
    }
}

/// Shared dispatch path for all four `/v1/*` endpoints.
async fn dispatch(state: &Arc<EdgeState>, headers: &HeaderMap, kind: RequestKind, mut body: Value) -> Response {
    if let Err(err) = validate_http_bearer(headers, &state.config.api_key, &state.config.jwt_secret) {
        return err.to_response("Invalid API key");
    }

    let client_wants_stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);
    let stream = client_wants_stream && state.config.enable_streaming;

    let Some(worker) = state.registry.pick_available(model_hint(&body)).await else {
        return no_worker_response(kind);
    };

    // The globally-disabled-streaming rewrite (§4.6) has to reach the
    // embedded OpenAI body too, not just the envelope's own `stream` flag —
    // otherwise the Worker would still ask the runtime for an SSE response.
    if let Some(obj) = body.as_object_mut() {
        obj.insert("stream".to_owned(), Value::Bool(stream));
    }

    let request_id = generate_request_id();
    let deadline = if stream { state.config.stream_timeout() } else { unary_timeout(&state.config, kind) };

    let request_frame = Envelope::new(kind.request_tag())
        .with_request_id(request_id.clone())
        .with_field("stream", stream)
        .with_value("data", body);

    if stream {
        stream_response(state, &worker, kind, request_id, deadline, request_frame).await
    } else {
        unary_response(state, &worker, kind, request_id, deadline, request_frame).await
    }
}

fn model_hint(body: &Value) -> Option<&str> {
    body.get("model").and_then(Value::as_str)
}

fn unary_timeout(config: &crate::config::EdgeConfig, kind: RequestKind) -> Duration {
    match kind {
        RequestKind::Models => config.models_timeout(),
        RequestKind::Chat | RequestKind::Completion => config.chat_timeout(),
        RequestKind::Embeddings => config.embeddings_timeout(),
    }
}

async fn unary_response(
    state: &Arc<EdgeState>,
    worker: &Arc<WorkerRecord>,
    kind: RequestKind,
    request_id: String,
    deadline: Duration,
    request_frame: Envelope,
) -> Response {
    let rx = state.pending.register_unary(request_id.clone(), kind, worker.client_id.clone(), deadline).await;
    worker.send_text(request_frame.encode());

    match rx.await {
        Ok(Outcome::Response(value)) => {
            if matches!(kind, RequestKind::Models) {
                state.models_cache.fill(value.clone()).await;
            }
            Json(value).into_response()
        }
        Ok(Outcome::Failed(failure)) => failure_response(&failure),
        Err(_) => EdgeError::Internal.to_response("pending entry dropped without an outcome"),
    }
}

async fn stream_response(
    state: &Arc<EdgeState>,
    worker: &Arc<WorkerRecord>,
    kind: RequestKind,
    request_id: String,
    deadline: Duration,
    request_frame: Envelope,
) -> Response {
    let rx = state.pending.register_stream(request_id.clone(), kind, worker.client_id.clone(), deadline).await;
    worker.send_text(request_frame.encode());

    let guarded = GuardedStream {
        inner: UnboundedReceiverStream::new(rx),
        request_id,
        worker: Arc::clone(worker),
        pending: Arc::clone(&state.pending),
        done: false,
    };

    let events = guarded.map(|event| {
        let event = match event {
            StreamEvent::Chunk(data) => Event::default().data(data.to_string()),
            StreamEvent::End => Event::default().data("[DONE]"),
            StreamEvent::Failed(failure) => Event::default().data(format!("[ERROR] {}", failure.message())),
        };
        Ok::<_, std::convert::Infallible>(event)
    });

    Sse::new(events).into_response()
}

/// Wraps the per-request stream receiver so a client disconnect (which
/// drops this future without a terminal event ever arriving) still sends
/// `cancel_request` and releases the pending entry (§4.6, §4.8, §8 S6).
struct GuardedStream {
    inner: UnboundedReceiverStream<StreamEvent>,
    request_id: String,
    worker: Arc<WorkerRecord>,
    pending: Arc<crate::pending::PendingRequestTable>,
    done: bool,
}

impl Stream for GuardedStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = Pin::new(&mut self.inner).poll_next(cx);
        if matches!(poll, Poll::Ready(Some(StreamEvent::End)) | Poll::Ready(Some(StreamEvent::Failed(_))) | Poll::Ready(None)) {
            self.done = true;
        }
        poll
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.worker.send_text(Envelope::cancel_request(self.request_id.clone()).encode());
        let pending = Arc::clone(&self.pending);
        let id = self.request_id.clone();
        tokio::spawn(async move {
            pending.cancel_by_client(&id).await;
        });
    }
}
