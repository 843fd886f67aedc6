//! # Message frames.
//!
//! A [`MessageFrame`] is the typed envelope carried by a [`Queue`](crate::Queue).
//! Frames travel JSON-encoded, so they can cross any boundary a byte channel can:
//!
//! ```text
//! {"type":"QUERY","data":{"op":"sum","args":[1,2]},
//!  "response_queue":"5f0c…","message_id":"9a41…","session_id":"c2d7…"}
//! ```
//!
//! ## Rules
//! - `message_id` is generated when absent (also on decode).
//! - A `QUERY` names its response queue by [`QueueId`]; the receiving side resolves
//!   it through a [`QueueRegistry`](crate::QueueRegistry).
//! - A `RESPONSE` copies the `session_id` of the `QUERY` it answers.
//! - Fields are private; a frame cannot change once it has been queued.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueueError;

/// Frame types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameKind {
    /// No-op placeholder.
    Empty,
    /// Control: terminate the listener.
    Exit,
    /// Ordinary payload.
    Data,
    /// Payload expecting a `RESPONSE` on the named queue.
    Query,
    /// Answer to a prior `QUERY`, correlated by session id.
    Response,
}

impl FrameKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Empty => "EMPTY",
            FrameKind::Exit => "EXIT",
            FrameKind::Data => "DATA",
            FrameKind::Query => "QUERY",
            FrameKind::Response => "RESPONSE",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a queue, resolvable through a [`QueueRegistry`](crate::QueueRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueId(String);

impl QueueId {
    /// Fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Typed envelope carried by a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFrame {
    #[serde(rename = "type")]
    kind: FrameKind,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    response_queue: Option<QueueId>,
    #[serde(default)]
    message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

impl MessageFrame {
    /// Frame of any kind with a fresh message id.
    pub fn new(kind: FrameKind, data: Value) -> Self {
        Self {
            kind,
            data,
            response_queue: None,
            message_id: uuid::Uuid::new_v4().to_string(),
            session_id: None,
        }
    }

    /// `DATA` frame.
    pub fn data(data: Value) -> Self {
        Self::new(FrameKind::Data, data)
    }

    /// `EXIT` control frame.
    pub fn exit() -> Self {
        Self::new(FrameKind::Exit, Value::Null)
    }

    /// `EMPTY` placeholder frame.
    pub fn empty() -> Self {
        Self::new(FrameKind::Empty, Value::Null)
    }

    /// `RESPONSE` frame answering `query` (same session id).
    pub fn response(data: Value, query: &MessageFrame) -> Self {
        Self {
            session_id: query.session_id.clone(),
            ..Self::new(FrameKind::Response, data)
        }
    }

    /// Names the queue a response should be sent to.
    pub fn with_response_queue(mut self, id: QueueId) -> Self {
        self.response_queue = Some(id);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = message_id.into();
        self
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Payload.
    pub fn payload(&self) -> &Value {
        &self.data
    }

    /// Consumes the frame, returning the payload.
    pub fn into_payload(self) -> Value {
        self.data
    }

    pub fn response_queue(&self) -> Option<&QueueId> {
        self.response_queue.as_ref()
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Encodes the frame for the wire.
    pub fn encode(&self) -> Result<Vec<u8>, QueueError> {
        serde_json::to_vec(self).map_err(|e| QueueError::InvalidFormat {
            reason: e.to_string(),
        })
    }

    /// Decodes a frame; unknown types and malformed payloads are `InvalidFormat`.
    pub fn decode(bytes: &[u8]) -> Result<Self, QueueError> {
        let mut frame: MessageFrame =
            serde_json::from_slice(bytes).map_err(|e| QueueError::InvalidFormat {
                reason: e.to_string(),
            })?;
        if frame.message_id.is_empty() {
            frame.message_id = uuid::Uuid::new_v4().to_string();
        }
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn response_copies_the_query_session() {
        let query = MessageFrame::new(FrameKind::Query, json!(1))
            .with_response_queue(QueueId::from("replies"))
            .with_session_id("s-1");
        let resp = MessageFrame::response(json!(2), &query);

        assert_eq!(resp.kind(), FrameKind::Response);
        assert_eq!(resp.session_id(), Some("s-1"));
        assert_ne!(resp.message_id(), query.message_id());
        assert!(resp.response_queue().is_none());
    }

    #[test]
    fn decode_fills_missing_message_id() {
        let frame = MessageFrame::decode(br#"{"type":"DATA","data":[1,2]}"#).unwrap();
        assert_eq!(frame.kind(), FrameKind::Data);
        assert_eq!(frame.payload(), &json!([1, 2]));
        assert!(!frame.message_id().is_empty());
    }

    #[test]
    fn unknown_type_is_invalid_format() {
        let err = MessageFrame::decode(br#"{"type":"REFRESH","data":null}"#).unwrap_err();
        assert!(matches!(err, QueueError::InvalidFormat { .. }));

        let err = MessageFrame::decode(b"not json").unwrap_err();
        assert_eq!(err.as_label(), "queue_invalid_format");
    }

    #[test]
    fn wire_names_are_uppercase() {
        let bytes = MessageFrame::exit().encode().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""type":"EXIT""#));
        assert!(!text.contains("response_queue"));
    }
}
