// SPDX-License-Identifier: MIT

//! The closed set of envelope `type` tags (§3, §4.1).
//!
//! Tags are compared case-insensitively after trimming whitespace — a
//! compatibility concession some worker builds rely on.

use std::fmt;

/// All recognized envelope tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Auth,
    AuthResult,
    Ping,
    Pong,
    ChatRequest,
    CompletionRequest,
    EmbeddingsRequest,
    ModelsRequest,
    CancelRequest,
    ChatResponse,
    CompletionResponse,
    EmbeddingsResponse,
    ModelsResponse,
    StreamChunk,
    StreamEnd,
    Error,
    ErrorResponse,
}

impl MessageTag {
    /// Parse a raw `type` value, normalizing case and surrounding whitespace.
    /// Returns `None` for anything outside the closed set.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Some(match normalized.as_str() {
            "auth" => Self::Auth,
            "auth_result" => Self::AuthResult,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "chat_request" => Self::ChatRequest,
            "completion_request" => Self::CompletionRequest,
            "embeddings_request" => Self::EmbeddingsRequest,
            "models_request" => Self::ModelsRequest,
            "cancel_request" => Self::CancelRequest,
            "chat_response" => Self::ChatResponse,
            "completion_response" => Self::CompletionResponse,
            "embeddings_response" => Self::EmbeddingsResponse,
            "models_response" => Self::ModelsResponse,
            "stream_chunk" => Self::StreamChunk,
            "stream_end" => Self::StreamEnd,
            "error" => Self::Error,
            "error_response" => Self::ErrorResponse,
            _ => return None,
        })
    }

    /// Canonical lowercase wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::AuthResult => "auth_result",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::ChatRequest => "chat_request",
            Self::CompletionRequest => "completion_request",
            Self::EmbeddingsRequest => "embeddings_request",
            Self::ModelsRequest => "models_request",
            Self::CancelRequest => "cancel_request",
            Self::ChatResponse => "chat_response",
            Self::CompletionResponse => "completion_response",
            Self::EmbeddingsResponse => "embeddings_response",
            Self::ModelsResponse => "models_response",
            Self::StreamChunk => "stream_chunk",
            Self::StreamEnd => "stream_end",
            Self::Error => "error",
            Self::ErrorResponse => "error_response",
        }
    }

    /// True for the five Edge→Worker request tags.
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::ChatRequest
                | Self::CompletionRequest
                | Self::EmbeddingsRequest
                | Self::ModelsRequest
                | Self::CancelRequest
        )
    }
}

impl fmt::Display for MessageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
