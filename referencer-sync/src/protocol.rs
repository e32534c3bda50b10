//! JSON wire protocol between browser clients and the sync server.
//!
//! ```text
//! client → server   {type: <action>, payload: {...}, requestId?}
//! server → client   {type: "state",  payload: WorkspaceSnapshot}
//!                   {type: "ack",    payload: {}, requestId?}
//!                   {type: "error",  payload: {message}, requestId?}
//!                   {type: "action", payload: {actionType, ...}, sourceClientId, requestId?}
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::action::ACTION_TYPE_KEY;
use crate::model::WorkspaceSnapshot;

/// Inbound envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: String,
    /// Absent, null and non-object payloads read as empty; the action
    /// decoder then reports the missing fields.
    #[serde(default, deserialize_with = "object_or_empty")]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

fn object_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map,
        _ => Map::new(),
    })
}

impl ClientMessage {
    pub fn new(kind: impl Into<String>, payload: Value, request_id: Option<String>) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: kind.into(),
            payload,
            request_id,
        }
    }

    /// Decode one text frame. Any failure here is fatal for the connection.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// The payload with the action name folded in as `actionType`.
    pub fn flattened_payload(&self) -> Value {
        let mut fields = self.payload.clone();
        fields.insert(ACTION_TYPE_KEY.to_string(), Value::String(self.kind.clone()));
        Value::Object(fields)
    }
}

/// Body of an `error` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Full snapshot, sent once right after connect
    State { payload: WorkspaceSnapshot },
    /// Sender-only confirmation that an action was persisted
    Ack {
        payload: Map<String, Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Sender-only rejection
    Error {
        payload: ErrorPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    /// Applied action relayed to the other peers of the workspace
    Action {
        payload: Value,
        source_client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    pub fn state(snapshot: WorkspaceSnapshot) -> Self {
        Self::State { payload: snapshot }
    }

    pub fn ack(request_id: Option<String>) -> Self {
        Self::Ack {
            payload: Map::new(),
            request_id,
        }
    }

    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        Self::Error {
            payload: ErrorPayload {
                message: message.into(),
            },
            request_id,
        }
    }

    /// `payload` is the flattened `{actionType, ...}` object.
    pub fn action(payload: Value, source_client_id: impl Into<String>, request_id: Option<String>) -> Self {
        Self::Action {
            payload,
            source_client_id: source_client_id.into(),
            request_id,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::State { .. } => "state",
            Self::Ack { .. } => "ack",
            Self::Error { .. } => "error",
            Self::Action { .. } => "action",
        }
    }
}

/// Protocol and transport errors. Fatal to the affected connection only.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("Serialization error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Binary frame is not UTF-8")]
    InvalidUtf8,
    #[error("WebSocket error: {0}")]
    Transport(#[from] tungstenite::Error),
}

/// Extract the workspace id from an upgrade path of the form `/ws/{id}`.
pub fn workspace_id_from_path(path: &str) -> Option<&str> {
    let id = path.strip_prefix("/ws/")?;
    let id = id.split('?').next().unwrap_or_default();
    if id.is_empty() || id.contains('/') {
        return None;
    }
    Some(id)
}
