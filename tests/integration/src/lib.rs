// SPDX-License-Identifier: MIT

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `bridge-edge` and `bridge-worker` binaries as
//! subprocesses, plus an in-process mock of the local inference
//! runtime the Worker talks to, and exercises the pair over HTTP.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt as _;
use serde_json::{json, Value};
use tokio::sync::RwLock;

/// Resolve the path to a compiled workspace binary.
fn workspace_binary(name: &str) -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/integration → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join(name)
}

/// Find a free TCP port by binding to :0 then releasing it.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Behavior the mock inference runtime hands back to the Worker.
#[derive(Clone, Default)]
struct MockConfig {
    chat_unary: Option<Value>,
    chat_stream_chunks: Option<Vec<Value>>,
    chat_hang: bool,
    models: Option<Value>,
}

/// A stand-in for a local OpenAI-compatible runtime (what a real Worker
/// would point `LM_STUDIO_HOST`/`LM_STUDIO_PORT` at).
pub struct MockUpstream {
    pub port: u16,
    config: Arc<RwLock<MockConfig>>,
    task: tokio::task::JoinHandle<()>,
}

impl MockUpstream {
    pub async fn start() -> anyhow::Result<Self> {
        let port = free_port()?;
        let config = Arc::new(RwLock::new(MockConfig::default()));

        let router = Router::new()
            .route("/v1/models", get(models_handler))
            .route("/v1/chat/completions", post(chat_handler))
            .route("/v1/completions", post(chat_handler))
            .route("/v1/embeddings", post(chat_handler))
            .with_state(Arc::clone(&config));

        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        Ok(Self { port, config, task })
    }

    pub async fn set_chat_unary(&self, value: Value) {
        self.config.write().await.chat_unary = Some(value);
    }

    pub async fn set_chat_stream(&self, chunks: Vec<Value>) {
        self.config.write().await.chat_stream_chunks = Some(chunks);
    }

    pub async fn set_chat_hang(&self) {
        self.config.write().await.chat_hang = true;
    }

    pub async fn set_models(&self, value: Value) {
        self.config.write().await.models = Some(value);
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn models_handler(State(cfg): State<Arc<RwLock<MockConfig>>>) -> Json<Value> {
    let cfg = cfg.read().await;
    Json(cfg.models.clone().unwrap_or_else(|| json!({"object": "list", "data": []})))
}

async fn chat_handler(State(cfg): State<Arc<RwLock<MockConfig>>>, Json(body): Json<Value>) -> Response {
    let snapshot = cfg.read().await.clone();

    if snapshot.chat_hang {
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves");
    }

    let wants_stream = body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    if wants_stream {
        let chunks = snapshot.chat_stream_chunks.unwrap_or_default();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<String>();
        tokio::spawn(async move {
            for chunk in chunks {
                if tx.send(format!("data: {chunk}\n\n")).is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(15)).await;
            }
            let _ = tx.send("data: [DONE]\n\n".to_owned());
        });

        let body_stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
            .map(|chunk| Ok::<_, std::convert::Infallible>(bytes::Bytes::from(chunk)));
        let mut response = Response::new(axum::body::Body::from_stream(body_stream));
        response
            .headers_mut()
            .insert(axum::http::header::CONTENT_TYPE, axum::http::HeaderValue::from_static("text/event-stream"));
        response
    } else {
        use axum::response::IntoResponse;
        let value = snapshot.chat_unary.unwrap_or_else(|| json!({"choices": []}));
        Json(value).into_response()
    }
}

/// A running `bridge-edge` subprocess, killed on drop.
pub struct EdgeProcess {
    child: Child,
    pub port: u16,
    pub api_key: String,
}

impl EdgeProcess {
    /// Spawn the Edge with `overrides` layered on top of sensible test
    /// defaults (a free port, a fixed API key, short timeouts).
    pub fn start(api_key: &str, overrides: &[(&str, &str)]) -> anyhow::Result<Self> {
        let binary = workspace_binary("bridge-edge");
        anyhow::ensure!(binary.exists(), "bridge-edge binary not found at {}", binary.display());

        let port = free_port()?;
        let mut cmd = Command::new(&binary);
        cmd.env("HOST", "127.0.0.1")
            .env("PORT", port.to_string())
            .env("API_KEY", api_key)
            .env("JWT_SECRET", "integration-test-jwt-secret")
            .env("LOG_LEVEL", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        for (key, value) in overrides {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;
        Ok(Self { child, port, api_key: api_key.to_owned() })
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        wait_http_ok(&format!("{}/health", self.base_url()), timeout).await
    }
}

impl Drop for EdgeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A running `bridge-worker` subprocess, killed on drop.
pub struct WorkerProcess {
    child: Child,
    pub health_port: u16,
}

impl WorkerProcess {
    pub fn start(
        edge: &EdgeProcess,
        upstream: &MockUpstream,
        client_id: &str,
        overrides: &[(&str, &str)],
    ) -> anyhow::Result<Self> {
        let binary = workspace_binary("bridge-worker");
        anyhow::ensure!(binary.exists(), "bridge-worker binary not found at {}", binary.display());

        let health_port = free_port()?;
        let mut cmd = Command::new(&binary);
        cmd.env("REMOTE_SERVER_URL", edge.ws_url())
            .env("API_KEY", &edge.api_key)
            .env("CLIENT_ID", client_id)
            .env("LM_STUDIO_HOST", "127.0.0.1")
            .env("LM_STUDIO_PORT", upstream.port.to_string())
            .env("HEALTH_CHECK_PORT", health_port.to_string())
            .env("RECONNECT_INTERVAL", "100")
            .env("LOG_LEVEL", "warn")
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        for (key, value) in overrides {
            cmd.env(key, value);
        }

        let child = cmd.spawn()?;
        Ok(Self { child, health_port })
    }

    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let url = format!("http://127.0.0.1:{}/health", self.health_port);
        let client = reqwest::Client::new();
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("worker did not become healthy within {timeout:?}");
            }
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status().is_success() {
                    if let Ok(body) = resp.json::<Value>().await {
                        if body.get("authenticated").and_then(Value::as_bool).unwrap_or(false) {
                            return Ok(());
                        }
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl Drop for WorkerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

async fn wait_http_ok(url: &str, timeout: Duration) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    let client = reqwest::Client::new();
    loop {
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("{url} did not become healthy within {timeout:?}");
        }
        if let Ok(resp) = client.get(url).send().await {
            if resp.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Read whole `text/event-stream` body, returning the sequence of `data:` payloads.
pub async fn collect_sse(resp: reqwest::Response) -> anyhow::Result<Vec<String>> {
    let mut stream = resp.bytes_stream();
    let mut buf = String::new();
    let mut events = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        buf.push_str(&String::from_utf8_lossy(&chunk));
        while let Some(idx) = buf.find("\n\n") {
            let frame = buf[..idx].to_owned();
            buf.drain(..idx + 2);
            for line in frame.lines() {
                if let Some(data) = line.strip_prefix("data:") {
                    events.push(data.trim().to_owned());
                }
            }
        }
    }
    Ok(events)
}
