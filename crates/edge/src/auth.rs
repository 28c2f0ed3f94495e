// SPDX-License-Identifier: MIT

//! Auth Gate (§4.4): the WS first-frame handshake, HTTP bearer validation,
//! and signed bearer token issuance/verification.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderMap;
use base64::Engine;
use ring::hmac;

use crate::error::EdgeError;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Claims carried by an issued bearer token (§3).
#[derive(Debug, Clone)]
pub struct TokenClaims {
    pub client_id: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Sign a bearer token for `client_id`, valid for `ttl`.
pub fn sign_token(secret: &str, client_id: &str, ttl: Duration) -> String {
    let issued_at = now_secs();
    let expires_at = issued_at + ttl.as_secs();
    let payload = format!("{client_id}|{issued_at}|{expires_at}");
    let payload_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload.as_bytes());
    let sig = sign(secret, &payload_b64);
    format!("{payload_b64}.{sig}")
}

/// Verify a bearer token's signature and expiry, returning its claims.
pub fn verify_token(secret: &str, token: &str) -> Option<TokenClaims> {
    let (payload_b64, sig) = token.split_once('.')?;
    if !constant_time_eq(&sign(secret, payload_b64), sig) {
        return None;
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let payload = String::from_utf8(payload).ok()?;
    let mut parts = payload.splitn(3, '|');
    let client_id = parts.next()?.to_owned();
    let issued_at: u64 = parts.next()?.parse().ok()?;
    let expires_at: u64 = parts.next()?.parse().ok()?;
    if expires_at < now_secs() {
        return None;
    }
    Some(TokenClaims { client_id, issued_at, expires_at })
}

fn sign(secret: &str, payload_b64: &str) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes());
    let tag = hmac::sign(&key, payload_b64.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(tag.as_ref())
}

/// HTTP-side auth (§4.4): accept either a valid unexpired signed token or
/// a byte-exact match against the configured API key.
pub fn validate_http_bearer(headers: &HeaderMap, api_key: &str, jwt_secret: &str) -> Result<(), EdgeError> {
    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(EdgeError::Auth)?;
    let credential = header.strip_prefix("Bearer ").ok_or(EdgeError::Auth)?;

    if verify_token(jwt_secret, credential).is_some() {
        return Ok(());
    }
    if constant_time_eq(credential, api_key) {
        return Ok(());
    }
    Err(EdgeError::Auth)
}

/// Outcome of validating a Worker's first `auth` frame (§4.4).
pub enum AuthOutcome {
    Ok { client_id: String, token: String },
    InvalidApiKey,
    MissingClientId,
}

/// Validate a Worker's `auth{apiKey, clientId}` frame.
pub fn validate_worker_auth(
    api_key: &str,
    jwt_secret: &str,
    jwt_ttl: Duration,
    given_api_key: Option<&str>,
    given_client_id: Option<&str>,
) -> AuthOutcome {
    match given_api_key {
        Some(given) if constant_time_eq(given, api_key) => {}
        _ => return AuthOutcome::InvalidApiKey,
    }
    let client_id = match given_client_id {
        Some(id) if !id.trim().is_empty() => id.to_owned(),
        _ => return AuthOutcome::MissingClientId,
    };
    let token = sign_token(jwt_secret, &client_id, jwt_ttl);
    AuthOutcome::Ok { client_id, token }
}
