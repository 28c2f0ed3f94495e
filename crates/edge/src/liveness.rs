// SPDX-License-Identifier: MIT

//! Liveness Supervisor (§4.5): sweeps Worker transports every
//! `ws_ping_interval_ms`, pinging the quiet ones and terminating any that
//! missed the previous round's pong.

use std::sync::Arc;

use axum::extract::ws::Message;

use crate::state::EdgeState;

/// Spawn the background liveness sweep task.
pub fn spawn_liveness_supervisor(state: Arc<EdgeState>) {
    let interval = state.config.ws_ping_interval();

    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = timer.tick() => {}
            }

            let workers = state.registry.snapshot().await;
            for worker in workers {
                if worker.is_alive() {
                    worker.mark_alive(false);
                    worker.send(Message::Ping(Vec::new().into()));
                } else {
                    tracing::warn!(client_id = %worker.client_id, "worker missed liveness ping, terminating");
                    worker.close(1000, "liveness timeout");
                    state.registry.remove(&worker.client_id).await;
                    state.pending.fail_all_for_worker(&worker.client_id).await;
                }
            }
        }
    });
}
