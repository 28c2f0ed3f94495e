// SPDX-License-Identifier: MIT

//! Stream Bridge (§4.7): splits an upstream SSE body into `stream_chunk` /
//! `stream_end` / `error` envelopes, with an optional fallback to a single
//! unary call when the streaming request itself never got off the ground
//! (§4.7, §9 — explicitly left to implementations).

use std::time::Duration;

use bridge_proto::{Envelope, RequestKind};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::upstream::UpstreamClient;

enum SseEvent {
    Data(Value),
    Done,
}

/// Parse one `\n`-delimited SSE frame (already split on the blank-line
/// terminator) for its `data:` line. Non-data fields (`event:`, `id:`,
/// comments) are ignored; a bare `[DONE]` sentinel ends the stream.
fn parse_sse_frame(frame: &str) -> Option<SseEvent> {
    for line in frame.lines() {
        let Some(payload) = line.strip_prefix("data:") else { continue };
        let payload = payload.trim();
        if payload.is_empty() {
            continue;
        }
        if payload == "[DONE]" {
            return Some(SseEvent::Done);
        }
        return serde_json::from_str(payload).ok().map(SseEvent::Data);
    }
    None
}

fn send(outbound: &mpsc::UnboundedSender<Message>, envelope: Envelope) {
    let _ = outbound.send(Message::Text(envelope.encode().into()));
}

/// Run one streaming request end to end, emitting frames to `outbound`
/// until `stream_end`/`error` or `cancel` fires.
pub async fn bridge_stream(
    upstream: &UpstreamClient,
    kind: RequestKind,
    body: &Value,
    request_id: &str,
    timeout: Duration,
    outbound: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
) {
    let response = match upstream.stream(kind, body, timeout).await {
        Ok(resp) => resp,
        Err(err) => {
            fall_back_to_unary(upstream, kind, body, request_id, timeout, &outbound, err).await;
            return;
        }
    };

    let mut body_stream = response.bytes_stream();
    let mut buf = String::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = body_stream.next() => {
                match chunk {
                    Some(Ok(bytes)) => {
                        buf.push_str(&String::from_utf8_lossy(&bytes));
                        if !drain_frames(&mut buf, request_id, &outbound) {
                            return;
                        }
                    }
                    Some(Err(err)) => {
                        send(&outbound, Envelope::error(Some(request_id.to_owned()), err.to_string()));
                        return;
                    }
                    None => {
                        send(&outbound, Envelope::stream_end(request_id));
                        return;
                    }
                }
            }
        }
    }
}

/// Drain complete `\n\n`-terminated frames from `buf`, forwarding each.
/// Returns `false` once `stream_end` has been sent (caller should stop).
fn drain_frames(buf: &mut String, request_id: &str, outbound: &mpsc::UnboundedSender<Message>) -> bool {
    while let Some(pos) = buf.find("\n\n") {
        let frame = buf[..pos].to_owned();
        buf.drain(..=pos + 1);
        match parse_sse_frame(&frame) {
            Some(SseEvent::Done) => {
                send(outbound, Envelope::stream_end(request_id));
                return false;
            }
            Some(SseEvent::Data(value)) => {
                send(outbound, Envelope::stream_chunk(request_id, value));
            }
            None => {}
        }
    }
    true
}

async fn fall_back_to_unary(
    upstream: &UpstreamClient,
    kind: RequestKind,
    body: &Value,
    request_id: &str,
    timeout: Duration,
    outbound: &mpsc::UnboundedSender<Message>,
    original_err: anyhow::Error,
) {
    tracing::debug!(request_id, err = %original_err, "stream open failed, falling back to unary");
    match upstream.unary(kind, body, timeout).await {
        Ok(value) => {
            send(outbound, Envelope::stream_chunk(request_id, value));
            send(outbound, Envelope::stream_end(request_id));
        }
        Err(fallback_err) => {
            let message = format!("{original_err}; fallback also failed: {fallback_err}");
            send(outbound, Envelope::error(Some(request_id.to_owned()), message));
        }
    }
}
