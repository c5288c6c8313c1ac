//! JSON-RPC 2.0 envelopes exchanged with the upstream MCP endpoint.
//!
//! The bridge never interprets `params` or `result` payloads beyond what the
//! dispatch table needs, so both are carried as opaque [`serde_json::Value`]s.

use crate::error::UpstreamError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub const JSONRPC_VERSION: &str = "2.0";

/// Protocol version announced in the upstream `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// Application error code the upstream reserves for "no valid session".
pub const INVALID_SESSION: i64 = -32001;

/// An outbound request. Every call gets its own correlation id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: String,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A one-way message; the upstream sends no response for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A decoded response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Result(Value),
    Error(RpcError),
}

impl ResponseEnvelope {
    /// Returns `true` when `value` carries a `result` or an `error` member,
    /// i.e. it answers a request rather than being a notification or a
    /// server-initiated request.
    pub fn is_answer(value: &Value) -> bool {
        value.get("result").is_some() || value.get("error").is_some()
    }

    /// Decodes a raw JSON-RPC response document.
    pub fn from_value(value: Value) -> Result<Self, UpstreamError> {
        let Value::Object(mut object) = value else {
            return Err(UpstreamError::Protocol(
                "response is not a JSON object".to_string(),
            ));
        };

        match (object.remove("result"), object.remove("error")) {
            (Some(result), None) => Ok(Self::Result(result)),
            (None, Some(error)) => serde_json::from_value(error)
                .map(Self::Error)
                .map_err(|e| UpstreamError::Protocol(format!("malformed error object: {e}"))),
            (Some(_), Some(_)) => Err(UpstreamError::Protocol(
                "response carries both result and error".to_string(),
            )),
            (None, None) => Err(UpstreamError::Protocol(
                "response carries neither result nor error".to_string(),
            )),
        }
    }

    /// Parses a response body that is expected to be a single JSON document.
    pub fn from_slice(body: &[u8]) -> Result<Self, UpstreamError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| UpstreamError::Protocol(format!("invalid JSON response: {e}")))?;
        Self::from_value(value)
    }
}
