//! JSON-RPC control protocol messages.
//!
//! Answers are deliberately minimal: `{"id":..,"result":{..}}` or
//! `{"id":..,"error":{"code":..,"message":..}}`, with no version member.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CODE_BAD_REQUEST;

/// Incoming control request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: ControlParams,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlParams {
    pub content_id: Option<String>,
    pub session_id: Option<String>,
    pub reason: Option<TerminateReason>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TerminateReason {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Control methods a client may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMethod {
    Start,
    Terminate,
}

impl JsonRpcRequest {
    pub fn method(&self) -> Option<ControlMethod> {
        match self.method.as_str() {
            "start" => Some(ControlMethod::Start),
            "terminate" => Some(ControlMethod::Terminate),
            _ => None,
        }
    }
}

/// Outgoing control answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonRpcResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonRpcResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

impl JsonRpcResponse {
    /// Successful `start`: where to fetch or send the media.
    pub fn start_url(url: &str, session_id: &str, id: Value) -> Self {
        Self {
            id,
            result: Some(JsonRpcResult {
                url: Some(url.to_string()),
                session_id: session_id.to_string(),
            }),
            error: None,
        }
    }

    /// Successful `terminate`.
    pub fn terminated(session_id: &str, id: Value) -> Self {
        Self {
            id,
            result: Some(JsonRpcResult {
                url: None,
                session_id: session_id.to_string(),
            }),
            error: None,
        }
    }

    pub fn error(code: i32, message: impl Into<String>, id: Value) -> Self {
        Self {
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }

    /// Error answer for a request that could not be parsed at all.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(CODE_BAD_REQUEST, message, Value::Null)
    }
}
