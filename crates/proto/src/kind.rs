// SPDX-License-Identifier: MIT

//! Request kind/mode taxonomy and the per-kind default deadlines (§4.3, §4.6).

use std::time::Duration;

use crate::tag::MessageTag;

/// What operation a pending entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Chat,
    Completion,
    Embeddings,
    Models,
}

/// Whether a pending entry expects one response or a chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Unary,
    Stream,
}

impl RequestKind {
    /// The Edge→Worker tag used to dispatch this kind of request.
    pub fn request_tag(&self) -> MessageTag {
        match self {
            Self::Chat => MessageTag::ChatRequest,
            Self::Completion => MessageTag::CompletionRequest,
            Self::Embeddings => MessageTag::EmbeddingsRequest,
            Self::Models => MessageTag::ModelsRequest,
        }
    }

    /// The Worker→Edge tag that carries this kind's unary response.
    pub fn response_tag(&self) -> MessageTag {
        match self {
            Self::Chat => MessageTag::ChatResponse,
            Self::Completion => MessageTag::CompletionResponse,
            Self::Embeddings => MessageTag::EmbeddingsResponse,
            Self::Models => MessageTag::ModelsResponse,
        }
    }

    /// Default deadline for this kind in the given mode (§4.3).
    /// Streaming modes share one 300s deadline regardless of kind.
    pub fn default_timeout(&self, mode: Mode) -> Duration {
        if mode == Mode::Stream {
            return Duration::from_secs(300);
        }
        match self {
            Self::Models => Duration::from_secs(10),
            Self::Chat | Self::Completion => Duration::from_secs(60),
            Self::Embeddings => Duration::from_secs(30),
        }
    }
}
