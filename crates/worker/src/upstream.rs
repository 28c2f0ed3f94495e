// SPDX-License-Identifier: MIT

//! Upstream Adapter (§4.7): talks to the local inference runtime over
//! plain HTTP, the same shape whether the call came in unary or streaming.

use std::time::Duration;

use bridge_proto::RequestKind;
use reqwest::Client;
use serde_json::Value;

/// HTTP client wrapper for the local LM Studio (or compatible) runtime.
pub struct UpstreamClient {
    base_url: String,
    client: Client,
}

impl UpstreamClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder().build().unwrap_or_default();
        Self { base_url, client }
    }

    fn path_for(&self, kind: RequestKind) -> &'static str {
        match kind {
            RequestKind::Chat => "/v1/chat/completions",
            RequestKind::Completion => "/v1/completions",
            RequestKind::Embeddings => "/v1/embeddings",
            RequestKind::Models => "/v1/models",
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Fire a unary request and return the parsed JSON body.
    pub async fn unary(&self, kind: RequestKind, body: &Value, timeout: Duration) -> anyhow::Result<Value> {
        let path = self.path_for(kind);
        let resp = if matches!(kind, RequestKind::Models) {
            self.client.get(self.url(path)).timeout(timeout).send().await?
        } else {
            self.client.post(self.url(path)).timeout(timeout).json(body).send().await?
        };
        let resp = resp.error_for_status()?;
        Ok(resp.json().await?)
    }

    /// Fire a streaming request and return the raw response whose body is
    /// an SSE byte stream to be parsed by [`crate::bridge`].
    pub async fn stream(&self, kind: RequestKind, body: &Value, timeout: Duration) -> anyhow::Result<reqwest::Response> {
        let path = self.path_for(kind);
        let resp = self.client.post(self.url(path)).timeout(timeout).json(body).send().await?;
        Ok(resp.error_for_status()?)
    }
}
