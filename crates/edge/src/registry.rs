// SPDX-License-Identifier: MIT

//! Worker Registry (§4.2): add/remove/get/pick_available plus the
//! replacement rule from §3 (same `clientId` reconnecting evicts the
//! previous transport with close code 1000 "replaced").

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{CloseFrame, Message};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// A registered Worker's transport handle and liveness state.
pub struct WorkerRecord {
    pub client_id: String,
    tx: mpsc::UnboundedSender<Message>,
    authenticated: AtomicBool,
    alive: AtomicBool,
    last_pong_at: RwLock<Instant>,
    /// Cancelled when this record is replaced or removed, to stop its
    /// connection's read/write loop.
    pub cancel: CancellationToken,
}

impl WorkerRecord {
    fn new(client_id: String, tx: mpsc::UnboundedSender<Message>) -> Arc<Self> {
        Arc::new(Self {
            client_id,
            tx,
            authenticated: AtomicBool::new(true),
            alive: AtomicBool::new(true),
            last_pong_at: RwLock::new(Instant::now()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    pub fn mark_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Relaxed);
    }

    pub async fn touch_pong(&self) {
        *self.last_pong_at.write().await = Instant::now();
    }

    /// Send a frame to this Worker. Errors (channel closed) are silent —
    /// the connection's own loop will observe the close and clean up.
    pub fn send(&self, msg: Message) {
        let _ = self.tx.send(msg);
    }

    pub fn send_text(&self, text: String) {
        self.send(Message::Text(text.into()));
    }

    pub fn close(&self, code: u16, reason: &'static str) {
        self.send(Message::Close(Some(CloseFrame { code, reason: reason.into() })));
        self.cancel.cancel();
    }
}

/// Process-wide table of connected Workers.
#[derive(Default)]
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, Arc<WorkerRecord>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a newly authenticated Worker, replacing any prior record
    /// for the same `client_id` (closed with code 1000 "replaced").
    pub async fn add(&self, client_id: String, tx: mpsc::UnboundedSender<Message>) -> Arc<WorkerRecord> {
        let record = WorkerRecord::new(client_id.clone(), tx);
        let mut guard = self.workers.write().await;
        if let Some(prev) = guard.insert(client_id, Arc::clone(&record)) {
            prev.close(1000, "replaced");
        }
        record
    }

    pub async fn remove(&self, client_id: &str) -> Option<Arc<WorkerRecord>> {
        self.workers.write().await.remove(client_id)
    }

    pub async fn get(&self, client_id: &str) -> Option<Arc<WorkerRecord>> {
        self.workers.read().await.get(client_id).cloned()
    }

    /// First Worker that is authenticated and alive (§4.2: linear scan,
    /// first-available policy — `model_hint` is an accepted but currently
    /// unused extension point, §9).
    pub async fn pick_available(&self, _model_hint: Option<&str>) -> Option<Arc<WorkerRecord>> {
        self.workers.read().await.values().find(|w| w.is_authenticated() && w.is_alive()).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Arc<WorkerRecord>> {
        self.workers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::UnboundedSender<Message>, mpsc::UnboundedReceiver<Message>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn add_replaces_prior_record_for_same_client_id() {
        let registry = WorkerRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, _rx2) = channel();

        let first = registry.add("w1".to_owned(), tx1).await;
        registry.add("w1".to_owned(), tx2).await;

        assert_eq!(registry.len().await, 1);
        assert!(first.cancel.is_cancelled());
        let Some(Message::Close(Some(frame))) = rx1.recv().await else {
            unreachable!("replaced worker must receive a close frame");
        };
        assert_eq!(frame.code, 1000);
        assert_eq!(frame.reason, "replaced");
    }

    #[tokio::test]
    async fn pick_available_skips_unauthenticated_and_dead() {
        let registry = WorkerRegistry::new();
        let (tx1, _rx1) = channel();
        let (tx2, _rx2) = channel();

        let dead = registry.add("dead".to_owned(), tx1).await;
        dead.mark_alive(false);
        let alive = registry.add("alive".to_owned(), tx2).await;

        let picked = registry.pick_available(None).await;
        assert_eq!(picked.map(|w| w.client_id.clone()), Some(alive.client_id.clone()));
    }

    #[tokio::test]
    async fn pick_available_returns_none_when_empty() {
        let registry = WorkerRegistry::new();
        assert!(registry.pick_available(None).await.is_none());
    }
}
