// SPDX-License-Identifier: MIT

//! Reconnect Loop (§4.7, §9): an explicit state machine —
//! `Disconnected -> Dialing -> Connected(unauth) -> Authenticated -> Serving -> Disconnected`
//! — wrapping the Edge WebSocket connection, re-dialing after a constant
//! interval on every drop.

use std::sync::Arc;

use bridge_proto::{Envelope, MessageTag};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::dispatch::{self, InFlight};
use crate::status::WorkerStatus;
use crate::upstream::UpstreamClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disconnected,
    Dialing,
    ConnectedUnauth,
    Authenticated,
    Serving,
}

/// Drive the connection for as long as `shutdown` is not cancelled,
/// re-dialing after `reconnect_interval` on every drop.
pub async fn run(
    config: Arc<WorkerConfig>,
    upstream: Arc<UpstreamClient>,
    status: Arc<WorkerStatus>,
    shutdown: CancellationToken,
) {
    let client_id = config.effective_client_id();
    let mut state = State::Disconnected;

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        state = transition(state, State::Dialing);
        match tokio_tungstenite::connect_async(&config.remote_server_url).await {
            Ok((stream, _)) => {
                state = transition(state, State::ConnectedUnauth);
                status.set_connected(true);
                match serve_connection(stream, &config, &client_id, &upstream, &status, &shutdown).await {
                    Ok(()) => tracing::info!(client_id = %client_id, "edge connection closed normally"),
                    Err(err) => tracing::warn!(client_id = %client_id, err = %err, "edge connection dropped"),
                }
            }
            Err(err) => {
                tracing::debug!(client_id = %client_id, err = %err, "dial failed, retrying");
            }
        }
        status.set_connected(false);
        state = transition(state, State::Disconnected);

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(config.reconnect_interval()) => {}
        }
    }
}

fn transition(from: State, to: State) -> State {
    tracing::debug!(?from, ?to, "worker state transition");
    to
}

async fn serve_connection(
    stream: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    config: &Arc<WorkerConfig>,
    client_id: &str,
    upstream: &Arc<UpstreamClient>,
    status: &Arc<WorkerStatus>,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let (mut ws_tx, mut ws_rx) = stream.split();
    let (tx, mut outbox) = mpsc::unbounded_channel::<Message>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let auth_frame = Envelope::auth(client_id.to_owned(), config.api_key.clone());
    let _ = tx.send(Message::Text(auth_frame.encode().into()));

    let in_flight = InFlight::new();
    let mut ping_timer = tokio::time::interval(config.ping_interval());
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_timer.tick().await; // first tick fires immediately; skip it
    let mut conn_state = State::ConnectedUnauth;

    let result = loop {
        tokio::select! {
            _ = shutdown.cancelled() => break Ok(()),
            _ = ping_timer.tick() => {
                let _ = tx.send(Message::Text(Envelope::ping().encode().into()));
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match handle_frame(&text, config, upstream, &in_flight, &tx) {
                            Ok(FrameOutcome::AuthSucceeded) => {
                                conn_state = transition(conn_state, State::Authenticated);
                                conn_state = transition(conn_state, State::Serving);
                                status.set_authenticated(true);
                            }
                            Ok(FrameOutcome::AuthFailed) => break Ok(()),
                            Ok(FrameOutcome::None) => {}
                            Err(err) => tracing::warn!(err = %err, "bad frame from edge"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Err(err)) => break Err(anyhow::Error::from(err)),
                    _ => {}
                }
            }
        }
    };

    drop(tx);
    let _ = writer.await;
    result
}

enum FrameOutcome {
    None,
    AuthSucceeded,
    AuthFailed,
}

fn handle_frame(
    text: &str,
    config: &Arc<WorkerConfig>,
    upstream: &Arc<UpstreamClient>,
    in_flight: &Arc<InFlight>,
    outbound: &mpsc::UnboundedSender<Message>,
) -> anyhow::Result<FrameOutcome> {
    let env = Envelope::decode(text).map_err(|e| anyhow::anyhow!(e.message))?;

    let outcome = match env.tag {
        MessageTag::AuthResult => {
            if env.field_bool("success") == Some(true) {
                tracing::info!("authenticated with edge");
                FrameOutcome::AuthSucceeded
            } else {
                tracing::error!(error = env.field_str("error").unwrap_or("unknown"), "edge rejected auth");
                FrameOutcome::AuthFailed
            }
        }
        MessageTag::Ping => {
            let _ = outbound.send(Message::Text(Envelope::pong().encode().into()));
            FrameOutcome::None
        }
        MessageTag::Pong => FrameOutcome::None,
        MessageTag::CancelRequest => {
            if let Some(id) = env.request_id {
                let in_flight = Arc::clone(in_flight);
                tokio::spawn(async move { in_flight.cancel(&id).await });
            }
            FrameOutcome::None
        }
        MessageTag::ChatRequest
        | MessageTag::CompletionRequest
        | MessageTag::EmbeddingsRequest
        | MessageTag::ModelsRequest => {
            dispatch::handle_request(
                env,
                Arc::clone(config),
                Arc::clone(upstream),
                Arc::clone(in_flight),
                outbound.clone(),
            );
            FrameOutcome::None
        }
        _ => FrameOutcome::None,
    };
    Ok(outcome)
}
