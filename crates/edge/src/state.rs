// SPDX-License-Identifier: MIT

//! Shared Edge state (§9: explicit owned objects constructed once at
//! startup and passed to handlers, not module-level singletons).

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::EdgeConfig;
use crate::models_cache::ModelsCache;
use crate::pending::PendingRequestTable;
use crate::registry::WorkerRegistry;

/// Everything an Edge HTTP/WS handler needs, held behind one `Arc`.
pub struct EdgeState {
    pub config: EdgeConfig,
    pub registry: WorkerRegistry,
    pub pending: Arc<PendingRequestTable>,
    pub models_cache: ModelsCache,
    pub shutdown: CancellationToken,
}

impl EdgeState {
    pub fn new(config: EdgeConfig, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            config,
            registry: WorkerRegistry::new(),
            pending: PendingRequestTable::new(),
            models_cache: ModelsCache::new(),
            shutdown,
        })
    }
}

/// Generate an opaque, globally-unique `requestId` with >=122 bits of
/// entropy (§4.6): a v4 UUID, which carries 122 random bits.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
