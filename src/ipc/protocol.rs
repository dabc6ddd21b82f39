// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-level reply and event shapes for the JSON IPC protocol.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::log::Level;

/// Errors surfaced to IPC clients. The display string is the wire `error`
/// field.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IpcError {
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("property not found")]
    PropertyNotFound,
    #[error("property unavailable")]
    PropertyUnavailable,
    #[error("unknown command")]
    UnknownCommand,
    #[error("unsupported")]
    Unsupported,
    #[error("{0}")]
    Other(String),
}

/// Reply to one request line. Serializes to
/// `{"error":"...","data":...,"request_id":...}` with absent fields
/// omitted.
#[derive(Debug, Serialize)]
pub struct Reply {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<i64>,
}

impl Reply {
    pub fn new(result: Result<Option<Value>, IpcError>, request_id: Option<i64>) -> Reply {
        match result {
            Ok(data) => Reply { error: "success".to_string(), data, request_id },
            Err(e) => Reply { error: e.to_string(), data: None, request_id },
        }
    }

    pub fn to_line(&self) -> String {
        // Reply has no map keys or non-string keys, serialization cannot
        // fail.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"unserializable"}"#.to_string())
    }
}

/// Asynchronous event pushed to a client, independent of any request.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The backend is going away; the session should close.
    Shutdown,
    /// A captured log line, enabled via `request_log_messages`.
    Log { prefix: String, level: Level, text: String },
    /// A property watched through `observe_property` changed.
    PropertyChange { id: u64, name: String, data: Value },
    /// A `script-message` directed at this client.
    ClientMessage { args: Vec<String> },
    /// Any other named event.
    Event { name: String, data: Option<Value> },
}

impl ClientEvent {
    /// Wire form of the event, or `None` for control-only events.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            ClientEvent::Shutdown => None,
            ClientEvent::Log { prefix, level, text } => Some(serde_json::json!({
                "event": "log-message",
                "prefix": prefix,
                "level": level.as_str(),
                "text": text,
            })),
            ClientEvent::PropertyChange { id, name, data } => Some(serde_json::json!({
                "event": "property-change",
                "id": id,
                "name": name,
                "data": data,
            })),
            ClientEvent::ClientMessage { args } => Some(serde_json::json!({
                "event": "client-message",
                "args": args,
            })),
            ClientEvent::Event { name, data } => {
                let mut v = serde_json::json!({ "event": name });
                if let (Value::Object(map), Some(Value::Object(extra))) = (&mut v, data.as_ref()) {
                    for (k, val) in extra {
                        map.entry(k.clone()).or_insert_with(|| val.clone());
                    }
                }
                Some(v)
            }
        }
    }
}
