// SPDX-License-Identifier: MIT

//! Worker configuration (§6).

use std::time::Duration;

/// Configuration for the Worker process.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "bridge-worker", about = "Bridges a local LM Studio runtime to a remote edge")]
pub struct WorkerConfig {
    /// WebSocket URL of the Edge to dial (`ws://` or `wss://`).
    #[arg(long, env = "REMOTE_SERVER_URL")]
    pub remote_server_url: String,

    /// Shared secret presented in the `auth` handshake frame.
    #[arg(long, env = "API_KEY")]
    pub api_key: String,

    /// This worker's identity. Defaults to a random UUID v4 if unset (§9).
    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    /// Host the local inference runtime listens on.
    #[arg(long, default_value = "localhost", env = "LM_STUDIO_HOST")]
    pub lm_studio_host: String,

    /// Port the local inference runtime listens on.
    #[arg(long, default_value_t = 1234, env = "LM_STUDIO_PORT")]
    pub lm_studio_port: u16,

    /// Port for this worker's own local `/health` endpoint.
    #[arg(long, default_value_t = 3001, env = "HEALTH_CHECK_PORT")]
    pub health_check_port: u16,

    /// Wait between re-dial attempts after a dropped Edge connection.
    #[arg(long, default_value_t = 5_000, env = "RECONNECT_INTERVAL")]
    pub reconnect_interval_ms: u64,

    /// Interval between application-level pings sent to the Edge (§4.7).
    #[arg(long, default_value_t = 30_000, env = "PING_INTERVAL_MS")]
    pub ping_interval_ms: u64,

    /// Deadline for a unary upstream request to the local runtime.
    #[arg(long, default_value_t = 300_000, env = "UPSTREAM_UNARY_TIMEOUT_MS")]
    pub upstream_unary_timeout_ms: u64,

    /// Deadline for a streaming upstream request to the local runtime.
    #[arg(long, default_value_t = 600_000, env = "UPSTREAM_STREAM_TIMEOUT_MS")]
    pub upstream_stream_timeout_ms: u64,

    /// Log level / default tracing directive.
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl WorkerConfig {
    /// This worker's effective identity: the configured value, or a
    /// per-process random UUID v4 if `CLIENT_ID` was left unset.
    pub fn effective_client_id(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    pub fn lm_studio_base_url(&self) -> String {
        format!("http://{}:{}", self.lm_studio_host, self.lm_studio_port)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms.max(1_000))
    }

    pub fn upstream_unary_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_unary_timeout_ms)
    }

    pub fn upstream_stream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_stream_timeout_ms)
    }
}
