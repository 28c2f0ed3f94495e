// SPDX-License-Identifier: MIT

//! Edge error kinds (§7) and their uniform HTTP rendering (§6).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of error kinds from §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeError {
    Auth,
    NoWorker,
    Timeout,
    WorkerGone,
    Upstream,
    BadRequest,
    UnknownTag,
    Internal,
}

impl EdgeError {
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::NoWorker => StatusCode::SERVICE_UNAVAILABLE,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::WorkerGone => StatusCode::SERVICE_UNAVAILABLE,
            Self::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::UnknownTag => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn type_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth_error",
            Self::NoWorker => "no_worker",
            Self::Timeout => "timeout",
            Self::WorkerGone => "worker_gone",
            Self::Upstream => "upstream_error",
            Self::BadRequest => "bad_request",
            Self::UnknownTag => "unknown_tag",
            Self::Internal => "api_error",
        }
    }

    pub fn to_body(&self, message: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            error: ErrorBody {
                message: message.into(),
                kind: self.type_str().to_owned(),
                code: self.http_status().as_u16(),
            },
        }
    }

    pub fn to_response(&self, message: impl Into<String>) -> Response {
        (self.http_status(), Json(self.to_body(message))).into_response()
    }
}

impl fmt::Display for EdgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_str())
    }
}

/// Uniform error body: `{error:{message, type, code}}` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: u16,
}
