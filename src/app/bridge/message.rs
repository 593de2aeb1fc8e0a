//! Bridge wire messages
//!
//! The only shapes that cross the sandbox boundary. Anything that does not deserialize into
//! [`BridgeMessage`] is dropped by the receiving side.

#![warn(clippy::all, rust_2018_idioms)]

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message exchanged between the host and a sandboxed context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Sandbox asks the host to fetch `url`
    #[serde(rename = "API_REQUEST")]
    ApiRequest {
        #[serde(rename = "requestId")]
        request_id: String,
        url: String,
    },

    /// Host answers a request; exactly one of `data` / `error` is meaningful
    #[serde(rename = "API_RESPONSE")]
    ApiResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Unsolicited runtime fault inside the sandbox
    #[serde(rename = "IFRAME_ERROR")]
    SandboxFault {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stack: Option<String>,
    },
}

impl BridgeMessage {
    /// Build the response for a fetch outcome
    pub fn response(request_id: impl Into<String>, outcome: Result<Value, String>) -> Self {
        let request_id = request_id.into();
        match outcome {
            Ok(data) => BridgeMessage::ApiResponse {
                request_id,
                data: Some(data),
                error: None,
            },
            Err(error) => BridgeMessage::ApiResponse {
                request_id,
                data: None,
                error: Some(error),
            },
        }
    }

    /// Parse a raw message, `None` for anything that is not a known shape
    pub fn parse(raw: &str) -> Option<Self> {
        match serde_json::from_str(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                trace_debug!("Dropping unrecognized bridge message: {}", e);
                None
            }
        }
    }

    /// Parse an already-decoded JSON value
    pub fn from_value(value: Value) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    pub fn to_json(&self) -> String {
        // Serializing these variants cannot fail: all keys are strings
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Wire tag of the message
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeMessage::ApiRequest { .. } => "API_REQUEST",
            BridgeMessage::ApiResponse { .. } => "API_RESPONSE",
            BridgeMessage::SandboxFault { .. } => "IFRAME_ERROR",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        match self {
            BridgeMessage::ApiRequest { request_id, .. }
            | BridgeMessage::ApiResponse { request_id, .. } => Some(request_id),
            BridgeMessage::SandboxFault { .. } => None,
        }
    }
}

/// Outcome a waiting `fetchData` call settles with; an error wins over data
pub(crate) fn response_outcome(data: Option<Value>, error: Option<String>) -> Result<Value, String> {
    match error {
        Some(error) => Err(error),
        None => Ok(data.unwrap_or(Value::Null)),
    }
}
