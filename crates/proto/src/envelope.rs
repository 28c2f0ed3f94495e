// SPDX-License-Identifier: MIT

//! Envelope encode/decode (§3, §4.1).
//!
//! An envelope is `{type, requestId?, timestamp?, ...type-specific fields}`.
//! The type-specific fields are kept as an opaque JSON object (`body`) —
//! this layer never interprets OpenAI request/response shapes.

use serde_json::{Map, Value};

use crate::tag::MessageTag;

/// A decoded envelope: tag plus whatever else was in the object.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub tag: MessageTag,
    pub request_id: Option<String>,
    pub timestamp: Option<u64>,
    /// Remaining fields, with `type`/`requestId`/`timestamp` removed.
    pub body: Map<String, Value>,
}

/// Failure to decode a frame into a known envelope.
///
/// Carries the `requestId` when one was present, so the caller can still
/// correlate the resulting `error` frame back to a pending entry (§4.1).
#[derive(Debug, Clone)]
pub struct EnvelopeError {
    pub request_id: Option<String>,
    pub message: String,
}

impl Envelope {
    /// Construct a bare envelope with no body fields.
    pub fn new(tag: MessageTag) -> Self {
        Self { tag, request_id: None, timestamp: None, body: Map::new() }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.body.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.body.insert(key.to_owned(), value);
        self
    }

    /// Decode a raw WS text frame. Unknown or missing `type` is reported as
    /// [`EnvelopeError`] rather than panicking — the caller turns this into
    /// the `error` frame required by §4.1.
    pub fn decode(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EnvelopeError { request_id: None, message: format!("Invalid JSON: {e}") })?;

        let mut obj = match value {
            Value::Object(obj) => obj,
            _ => {
                return Err(EnvelopeError {
                    request_id: None,
                    message: "Unknown message type: ".to_owned(),
                })
            }
        };

        let request_id = obj.remove("requestId").and_then(|v| v.as_str().map(str::to_owned));
        let timestamp = obj.remove("timestamp").and_then(|v| v.as_u64());

        let raw_tag = obj.remove("type").and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
        let tag = MessageTag::parse(&raw_tag).ok_or_else(|| EnvelopeError {
            request_id: request_id.clone(),
            message: format!("Unknown message type: {raw_tag}"),
        })?;

        Ok(Self { tag, request_id, timestamp, body: obj })
    }

    /// Serialize back to a JSON frame for sending over the wire.
    pub fn encode(&self) -> String {
        let mut obj = self.body.clone();
        obj.insert("type".to_owned(), Value::String(self.tag.as_str().to_owned()));
        if let Some(ref rid) = self.request_id {
            obj.insert("requestId".to_owned(), Value::String(rid.clone()));
        }
        if let Some(ts) = self.timestamp {
            obj.insert("timestamp".to_owned(), Value::Number(ts.into()));
        }
        serde_json::to_string(&Value::Object(obj)).unwrap_or_else(|_| "{}".to_owned())
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.body.get(key).and_then(Value::as_str)
    }

    pub fn field_bool(&self, key: &str) -> Option<bool> {
        self.body.get(key).and_then(Value::as_bool)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    // -- Convenience constructors for the common envelope shapes --

    pub fn auth(client_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::new(MessageTag::Auth)
            .with_field("clientId", client_id.into())
            .with_field("apiKey", api_key.into())
    }

    pub fn auth_result_ok(token: impl Into<String>) -> Self {
        Self::new(MessageTag::AuthResult)
            .with_field("success", true)
            .with_field("token", token.into())
    }

    pub fn auth_result_err(message: impl Into<String>) -> Self {
        Self::new(MessageTag::AuthResult)
            .with_field("success", false)
            .with_field("error", message.into())
    }

    pub fn error(request_id: Option<String>, message: impl Into<String>) -> Self {
        let mut env = Self::new(MessageTag::Error).with_field("error", message.into());
        if let Some(rid) = request_id {
            env = env.with_request_id(rid);
        }
        env
    }

    pub fn error_response(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(MessageTag::ErrorResponse)
            .with_field("error", message.into())
            .with_request_id(request_id)
    }

    pub fn cancel_request(request_id: impl Into<String>) -> Self {
        Self::new(MessageTag::CancelRequest).with_request_id(request_id)
    }

    pub fn stream_chunk(request_id: impl Into<String>, data: Value) -> Self {
        Self::new(MessageTag::StreamChunk).with_request_id(request_id).with_value("data", data)
    }

    pub fn stream_end(request_id: impl Into<String>) -> Self {
        Self::new(MessageTag::StreamEnd).with_request_id(request_id)
    }

    pub fn ping() -> Self {
        Self::new(MessageTag::Ping)
    }

    pub fn pong() -> Self {
        Self::new(MessageTag::Pong)
    }
}

impl From<EnvelopeError> for Envelope {
    fn from(err: EnvelopeError) -> Self {
        Envelope::error(err.request_id, err.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_roundtrips_unknown_fields() -> anyhow::Result<()> {
        let text = r#"{"type":"chat_request","requestId":"r1","data":{"model":"x"}}"#;
        let env = Envelope::decode(text).map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(env.tag, MessageTag::ChatRequest);
        assert_eq!(env.request_id.as_deref(), Some("r1"));
        assert_eq!(env.field("data").and_then(|v| v.get("model")).and_then(Value::as_str), Some("x"));
        Ok(())
    }

    #[test]
    fn decode_missing_type_is_error() {
        let Err(err) = Envelope::decode(r#"{"requestId":"r1"}"#) else {
            unreachable!("missing type must fail to decode");
        };
        assert_eq!(err.request_id.as_deref(), Some("r1"));
        assert!(err.message.starts_with("Unknown message type:"));
    }

    #[test]
    fn decode_unknown_tag_is_error() {
        let Err(err) = Envelope::decode(r#"{"type":"frobnicate"}"#) else {
            unreachable!("unknown tag must fail to decode");
        };
        assert!(err.message.contains("frobnicate"));
    }

    #[test]
    fn decode_tag_is_case_and_space_insensitive() -> anyhow::Result<()> {
        let env = Envelope::decode(r#"{"type":"  STREAM_END  ","requestId":"r1"}"#)
            .map_err(|e| anyhow::anyhow!(e.message))?;
        assert_eq!(env.tag, MessageTag::StreamEnd);
        Ok(())
    }

    #[test]
    fn encode_includes_request_id_and_timestamp() -> anyhow::Result<()> {
        let env = Envelope::stream_chunk("r1", Value::String("A".to_owned()));
        let text = env.encode();
        let back: Value = serde_json::from_str(&text)?;
        assert_eq!(back["type"], "stream_chunk");
        assert_eq!(back["requestId"], "r1");
        assert_eq!(back["data"], "A");
        Ok(())
    }
}
