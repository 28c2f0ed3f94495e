// SPDX-License-Identifier: MIT

//! Pending-Request Table (§4.3): correlates an in-flight HTTP request with
//! its eventual outcome, delivered exactly once (§8 invariant 1), with a
//! per-entry deadline timer (§8 invariant 2 relies on prompt cleanup).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_proto::{Mode, RequestKind};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

/// Why a pending entry failed, carried through to the HTTP layer so it can
/// pick the right status code (§6, §7).
#[derive(Debug, Clone)]
pub enum Failure {
    Timeout,
    WorkerGone,
    Upstream(String),
    Cancelled,
}

impl Failure {
    pub fn message(&self) -> String {
        match self {
            Self::Timeout => "Request timeout".to_owned(),
            Self::WorkerGone => "Worker disconnected".to_owned(),
            Self::Upstream(msg) => msg.clone(),
            Self::Cancelled => "Request cancelled".to_owned(),
        }
    }
}

/// Terminal outcome of a unary request.
#[derive(Debug, Clone)]
pub enum Outcome {
    Response(Value),
    Failed(Failure),
}

/// One event in a streaming request's ordered sequence (§4.6).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(Value),
    End,
    Failed(Failure),
}

enum Sink {
    Unary(Mutex<Option<oneshot::Sender<Outcome>>>),
    Stream(mpsc::UnboundedSender<StreamEvent>),
}

struct Entry {
    #[allow(dead_code)] // kept for diagnostics/logging symmetry with §3's field list
    kind: RequestKind,
    #[allow(dead_code)]
    mode: Mode,
    worker_id: String,
    terminal: AtomicBool,
    deadline_cancel: CancellationToken,
    sink: Sink,
}

/// Process-wide table of in-flight requests, keyed by `requestId`.
pub struct PendingRequestTable {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl PendingRequestTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { entries: RwLock::new(HashMap::new()) })
    }

    pub async fn register_unary(
        self: &Arc<Self>,
        id: String,
        kind: RequestKind,
        worker_id: String,
        deadline: Duration,
    ) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        let entry = Arc::new(Entry {
            kind,
            mode: Mode::Unary,
            worker_id,
            terminal: AtomicBool::new(false),
            deadline_cancel: CancellationToken::new(),
            sink: Sink::Unary(Mutex::new(Some(tx))),
        });
        self.insert_and_arm_deadline(id, entry, deadline).await;
        rx
    }

    pub async fn register_stream(
        self: &Arc<Self>,
        id: String,
        kind: RequestKind,
        worker_id: String,
        deadline: Duration,
    ) -> mpsc::UnboundedReceiver<StreamEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let entry = Arc::new(Entry {
            kind,
            mode: Mode::Stream,
            worker_id,
            terminal: AtomicBool::new(false),
            deadline_cancel: CancellationToken::new(),
            sink: Sink::Stream(tx),
        });
        self.insert_and_arm_deadline(id, entry, deadline).await;
        rx
    }

    /// Inserts the entry before returning so a response racing in right
    /// after registration always finds it; only the deadline wait runs
    /// in a spawned task.
    async fn insert_and_arm_deadline(self: &Arc<Self>, id: String, entry: Arc<Entry>, deadline: Duration) {
        let cancel = entry.deadline_cancel.clone();
        let table = Arc::clone(self);
        self.entries.write().await.insert(id.clone(), entry);

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    table.fail(&id, Failure::Timeout).await;
                }
            }
        });
    }

    /// Swap an entry's terminal flag, returning it only if this call won
    /// the race. A second caller sees `None` and should log a warning.
    async fn claim_terminal(&self, id: &str) -> Option<Arc<Entry>> {
        let entry = self.entries.read().await.get(id).cloned()?;
        if entry.terminal.swap(true, Ordering::SeqCst) {
            tracing::warn!(request_id = id, "duplicate terminal outcome dropped");
            return None;
        }
        Some(entry)
    }

    async fn complete(&self, id: &str, outcome: Outcome, stream_event: StreamEvent) {
        let Some(entry) = self.claim_terminal(id).await else { return };
        entry.deadline_cancel.cancel();
        match &entry.sink {
            Sink::Unary(slot) => {
                if let Some(tx) = slot.lock().await.take() {
                    let _ = tx.send(outcome);
                }
            }
            Sink::Stream(tx) => {
                let _ = tx.send(stream_event);
            }
        }
        self.entries.write().await.remove(id);
    }

    pub async fn resolve(&self, id: &str, value: Value) {
        self.complete(id, Outcome::Response(value.clone()), StreamEvent::Chunk(value)).await;
    }

    pub async fn fail(&self, id: &str, failure: Failure) {
        self.complete(
            id,
            Outcome::Failed(failure.clone()),
            StreamEvent::Failed(failure),
        )
        .await;
    }

    pub async fn cancel_by_client(&self, id: &str) {
        self.fail(id, Failure::Cancelled).await;
    }

    /// Deliver one chunk of a stream. Chunks after the terminal event are
    /// discarded with a warning (§4.6 tie-break rule) rather than erroring.
    pub async fn feed_chunk(&self, id: &str, data: Value) {
        let Some(entry) = self.entries.read().await.get(id).cloned() else {
            tracing::warn!(request_id = id, "stream_chunk for unknown or finished request");
            return;
        };
        if entry.terminal.load(Ordering::SeqCst) {
            tracing::warn!(request_id = id, "stream_chunk after terminal event discarded");
            return;
        }
        match &entry.sink {
            Sink::Stream(tx) => {
                let _ = tx.send(StreamEvent::Chunk(data));
            }
            Sink::Unary(_) => {
                tracing::warn!(request_id = id, "stream_chunk for a unary request discarded");
            }
        }
    }

    pub async fn finish_stream(&self, id: &str) {
        self.complete(id, Outcome::Failed(Failure::Cancelled), StreamEvent::End).await;
    }

    /// §4.5: when a Worker's transport closes, every entry it owns fails
    /// with `WORKER_GONE` within one scheduler tick, not at its deadline.
    pub async fn fail_all_for_worker(&self, worker_id: &str) {
        let ids: Vec<String> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.worker_id == worker_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.fail(&id, Failure::WorkerGone).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.read().await.contains_key(id)
    }
}
