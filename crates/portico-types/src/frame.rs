//! JSON wire envelope for WebSocket transports.
//!
//! Every frame is a single JSON object with a `type` discriminant and a
//! caller-chosen string `id` used purely for correlation: `response`,
//! `error`, and `pong` frames echo the `id` of the frame they answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorBody;

/// Per-frame metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    pub timestamp: DateTime<Utc>,
}

impl FrameMeta {
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
        }
    }
}

impl Default for FrameMeta {
    fn default() -> Self {
        Self::now()
    }
}

/// One wire frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Invoke `function` with `params`; the peer answers with a `response`
    /// or `error` frame carrying the same `id`.
    Call {
        id: String,
        function: String,
        #[serde(default)]
        params: Value,
        #[serde(default)]
        metadata: FrameMeta,
    },

    /// Successful completion of the call with this `id`.
    Response {
        id: String,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        metadata: FrameMeta,
    },

    /// Failed completion of the call with this `id`.
    Error {
        id: String,
        error: ErrorBody,
        #[serde(default)]
        metadata: FrameMeta,
    },

    /// Expose a function to the peer across this connection; acknowledged
    /// with a `response` frame.
    Register {
        id: String,
        function: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        schema: Option<Value>,
        #[serde(default)]
        metadata: FrameMeta,
    },

    /// Application-level liveness probe; answered with `pong`.
    Ping {
        id: String,
        #[serde(default)]
        metadata: FrameMeta,
    },

    /// Answer to the `ping` with this `id`.
    Pong {
        id: String,
        #[serde(default)]
        metadata: FrameMeta,
    },
}

impl Frame {
    pub fn call(id: impl Into<String>, function: impl Into<String>, params: Value) -> Self {
        Frame::Call {
            id: id.into(),
            function: function.into(),
            params,
            metadata: FrameMeta::now(),
        }
    }

    pub fn response(id: impl Into<String>, result: Value) -> Self {
        Frame::Response {
            id: id.into(),
            result,
            metadata: FrameMeta::now(),
        }
    }

    pub fn error(id: impl Into<String>, error: ErrorBody) -> Self {
        Frame::Error {
            id: id.into(),
            error,
            metadata: FrameMeta::now(),
        }
    }

    pub fn register(id: impl Into<String>, function: impl Into<String>, schema: Option<Value>) -> Self {
        Frame::Register {
            id: id.into(),
            function: function.into(),
            schema,
            metadata: FrameMeta::now(),
        }
    }

    pub fn ping(id: impl Into<String>) -> Self {
        Frame::Ping {
            id: id.into(),
            metadata: FrameMeta::now(),
        }
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Frame::Pong {
            id: id.into(),
            metadata: FrameMeta::now(),
        }
    }

    /// The correlation id carried by every frame type.
    pub fn id(&self) -> &str {
        match self {
            Frame::Call { id, .. }
            | Frame::Response { id, .. }
            | Frame::Error { id, .. }
            | Frame::Register { id, .. }
            | Frame::Ping { id, .. }
            | Frame::Pong { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_frame_wire_shape() {
        let frame = Frame::call("7", "math.add", serde_json::json!({"a": 1, "b": 2}));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "call");
        assert_eq!(json["id"], "7");
        assert_eq!(json["function"], "math.add");
        assert_eq!(json["params"]["a"], 1);
        assert!(json["metadata"]["timestamp"].is_string());
    }

    #[test]
    fn frames_round_trip() {
        let frames = vec![
            Frame::call("1", "echo", Value::Null),
            Frame::response("1", serde_json::json!("hi")),
            Frame::error("2", ErrorBody::new(404, "function not found: nope")),
            Frame::register("3", "client.notify", None),
            Frame::ping("4"),
            Frame::pong("4"),
        ];
        for frame in frames {
            let text = serde_json::to_string(&frame).unwrap();
            let back: Frame = serde_json::from_str(&text).unwrap();
            assert_eq!(back.id(), frame.id());
            assert_eq!(
                std::mem::discriminant(&back),
                std::mem::discriminant(&frame)
            );
        }
    }

    #[test]
    fn response_echoes_call_id() {
        let call = Frame::call("abc-123", "f", Value::Null);
        let response = Frame::response(call.id(), Value::Null);
        assert_eq!(response.id(), "abc-123");
    }
}
