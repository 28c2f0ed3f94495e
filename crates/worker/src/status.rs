// SPDX-License-Identifier: MIT

//! Shared connection status, read by the local `/health` endpoint and
//! written by the reconnect loop as it moves through its state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct WorkerStatus {
    connected: AtomicBool,
    authenticated: AtomicBool,
}

impl WorkerStatus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Relaxed);
        if !value {
            self.authenticated.store(false, Ordering::Relaxed);
        }
    }

    pub fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Relaxed);
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Relaxed)
    }
}
