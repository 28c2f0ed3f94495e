// SPDX-License-Identifier: MIT

//! Models cache (§3): one entry per process, 60s TTL, no per-Worker
//! partitioning. Survives Worker replacement — only TTL expiry clears it.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::RwLock;

const TTL: Duration = Duration::from_secs(60);

struct Entry {
    payload: Value,
    expires_at: Instant,
}

#[derive(Default)]
pub struct ModelsCache {
    entry: RwLock<Option<Entry>>,
}

impl ModelsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached payload if still fresh.
    pub async fn fresh(&self) -> Option<Value> {
        let guard = self.entry.read().await;
        let entry = guard.as_ref()?;
        if entry.expires_at > Instant::now() {
            Some(entry.payload.clone())
        } else {
            None
        }
    }

    pub async fn fill(&self, payload: Value) {
        *self.entry.write().await = Some(Entry { payload, expires_at: Instant::now() + TTL });
    }
}
