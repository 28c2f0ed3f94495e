// SPDX-License-Identifier: MIT

//! End-to-end scenarios: a real `bridge-edge` and `bridge-worker`
//! subprocess pair, talking over a loopback WebSocket, fronting an
//! in-process mock of the local inference runtime.

use std::time::Duration;

use bridge_tests::{collect_sse, EdgeProcess, MockUpstream, WorkerProcess};
use serde_json::json;

const API_KEY: &str = "integration-test-key";

async fn spawn_pair(
    edge_overrides: &[(&str, &str)],
    worker_overrides: &[(&str, &str)],
) -> anyhow::Result<(EdgeProcess, WorkerProcess, MockUpstream)> {
    let upstream = MockUpstream::start().await?;
    let edge = EdgeProcess::start(API_KEY, edge_overrides)?;
    edge.wait_healthy(Duration::from_secs(5)).await?;
    let worker = WorkerProcess::start(&edge, &upstream, "worker-1", worker_overrides)?;
    worker.wait_healthy(Duration::from_secs(5)).await?;
    Ok((edge, worker, upstream))
}

#[tokio::test]
async fn models_response_is_cached() -> anyhow::Result<()> {
    let (edge, _worker, upstream) = spawn_pair(&[], &[]).await?;
    upstream.set_models(json!({"object": "list", "data": [{"id": "llama-3", "object": "model"}]})).await;

    let client = reqwest::Client::new();
    let url = format!("{}/v1/models", edge.base_url());

    let first: serde_json::Value = client
        .get(&url)
        .bearer_auth(API_KEY)
        .send()
        .await?
        .json()
        .await?;
    let second: serde_json::Value = client
        .get(&url)
        .bearer_auth(API_KEY)
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(first, second);
    assert_eq!(first["data"][0]["id"], "llama-3");
    Ok(())
}

#[tokio::test]
async fn no_worker_connected_returns_503() -> anyhow::Result<()> {
    let edge = EdgeProcess::start(API_KEY, &[])?;
    edge.wait_healthy(Duration::from_secs(5)).await?;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": []}))
        .send()
        .await?;

    assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["message"], "No available LM Studio clients");
    Ok(())
}

#[tokio::test]
async fn unary_chat_completion_happy_path() -> anyhow::Result<()> {
    let (edge, _worker, upstream) = spawn_pair(&[], &[]).await?;
    upstream
        .set_chat_unary(json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello there"}}]
        }))
        .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": [{"role": "user", "content": "hi"}]}))
        .send()
        .await?;

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["choices"][0]["message"]["content"], "hello there");
    Ok(())
}

#[tokio::test]
async fn streaming_chat_completion_forwards_chunks_in_order() -> anyhow::Result<()> {
    let (edge, _worker, upstream) = spawn_pair(&[], &[]).await?;
    upstream
        .set_chat_stream(vec![
            json!({"choices": [{"delta": {"content": "A"}}]}),
            json!({"choices": [{"delta": {"content": "B"}}]}),
            json!({"choices": [{"delta": {"content": "C"}}]}),
        ])
        .await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": [], "stream": true}))
        .send()
        .await?;

    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let events = collect_sse(resp).await?;

    assert_eq!(events.len(), 4);
    assert!(events[0].contains("\"content\":\"A\""));
    assert!(events[1].contains("\"content\":\"B\""));
    assert!(events[2].contains("\"content\":\"C\""));
    assert_eq!(events[3], "[DONE]");
    Ok(())
}

#[tokio::test]
async fn worker_that_never_responds_times_out() -> anyhow::Result<()> {
    let (edge, _worker, upstream) =
        spawn_pair(&[("CHAT_TIMEOUT_MS", "300")], &[("UPSTREAM_UNARY_TIMEOUT_MS", "60000")]).await?;
    upstream.set_chat_hang().await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": []}))
        .send()
        .await?;

    assert_eq!(resp.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
    let body: serde_json::Value = resp.json().await?;
    assert_eq!(body["error"]["message"], "Request timeout");
    Ok(())
}

#[tokio::test]
async fn client_disconnect_cancels_stream_mid_flight() -> anyhow::Result<()> {
    let (edge, _worker, upstream) = spawn_pair(&[], &[]).await?;
    // Chunks with a long delay between them so the client has time to
    // disconnect before the stream would naturally finish.
    upstream
        .set_chat_stream(vec![
            json!({"choices": [{"delta": {"content": "A"}}]}),
            json!({"choices": [{"delta": {"content": "B"}}]}),
        ])
        .await;

    let client = reqwest::Client::builder().build()?;
    let mut resp = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": [], "stream": true}))
        .send()
        .await?;

    // Read exactly one chunk, then drop the response — this closes the
    // client's half of the connection before the stream completes.
    let _ = resp.chunk().await?;
    drop(resp);

    // The process should stay healthy; there is nothing externally
    // observable from the disconnect besides the Worker's cancel_request
    // frame, which this subprocess-level harness cannot directly
    // inspect. Confirm the Edge is still serving new requests right
    // after, which would hang were the pending-request table left in a
    // bad state by the half-finished stream.
    tokio::time::sleep(Duration::from_millis(200)).await;
    upstream
        .set_chat_unary(json!({"choices": [{"message": {"role": "assistant", "content": "still alive"}}]}))
        .await;

    let follow_up = client
        .post(format!("{}/v1/chat/completions", edge.base_url()))
        .bearer_auth(API_KEY)
        .json(&json!({"model": "llama-3", "messages": []}))
        .send()
        .await?;
    assert_eq!(follow_up.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = follow_up.json().await?;
    assert_eq!(body["choices"][0]["message"]["content"], "still alive");
    Ok(())
}
