// SPDX-License-Identifier: MIT

//! Edge configuration (§6).

use std::time::Duration;

/// Configuration for the Edge process.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "bridge-edge", about = "OpenAI-compatible edge for NAT-hidden workers")]
pub struct EdgeConfig {
    /// Host to bind the HTTP/WS listener on.
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "PORT")]
    pub port: u16,

    /// Shared secret Workers and HTTP clients authenticate with.
    #[arg(long, env = "API_KEY")]
    pub api_key: String,

    /// Secret used to sign issued bearer tokens.
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: String,

    /// Lifetime of issued bearer tokens, in seconds.
    #[arg(long, default_value_t = 86_400, env = "JWT_EXPIRES_IN")]
    pub jwt_expires_in_secs: u64,

    /// Path the Worker WebSocket upgrades on.
    #[arg(long, default_value = "/ws", env = "WS_PATH")]
    pub ws_path: String,

    /// Interval between liveness-sweep pings to each Worker.
    #[arg(long, default_value_t = 30_000, env = "WS_PING_INTERVAL_MS")]
    pub ws_ping_interval_ms: u64,

    /// Whether `stream:true` requests are actually streamed.
    #[arg(long, default_value_t = true, env = "ENABLE_STREAMING")]
    pub enable_streaming: bool,

    /// Log level / default tracing directive.
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    /// Deadline for `models_request` (§4.3).
    #[arg(long, default_value_t = 10_000, env = "MODELS_TIMEOUT_MS")]
    pub models_timeout_ms: u64,

    /// Deadline for unary chat/completion requests (§4.3).
    #[arg(long, default_value_t = 60_000, env = "CHAT_TIMEOUT_MS")]
    pub chat_timeout_ms: u64,

    /// Deadline for embeddings requests (§4.3).
    #[arg(long, default_value_t = 30_000, env = "EMBEDDINGS_TIMEOUT_MS")]
    pub embeddings_timeout_ms: u64,

    /// Deadline for streaming requests, any kind (§4.3).
    #[arg(long, default_value_t = 300_000, env = "STREAM_TIMEOUT_MS")]
    pub stream_timeout_ms: u64,
}

impl EdgeConfig {
    pub fn ws_ping_interval(&self) -> Duration {
        Duration::from_millis(self.ws_ping_interval_ms.max(1_000))
    }

    pub fn jwt_expires_in(&self) -> Duration {
        Duration::from_secs(self.jwt_expires_in_secs)
    }

    pub fn models_timeout(&self) -> Duration {
        Duration::from_millis(self.models_timeout_ms)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_timeout_ms)
    }

    pub fn embeddings_timeout(&self) -> Duration {
        Duration::from_millis(self.embeddings_timeout_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }
}
