//! Error types for the stdio bridge and the session-error classifier.

use crate::protocol::{INTERNAL_ERROR, INVALID_SESSION, RpcError};
use serde_json::json;
use thiserror::Error;

/// Local failures: stdio, persisted state, configuration.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// A failed exchange with the upstream endpoint.
///
/// `Clone` because one handshake outcome is handed to every caller that
/// awaited it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Network(String),

    #[error("upstream request timed out")]
    Timeout,

    #[error("upstream returned HTTP {status}")]
    HttpStatus {
        status: u16,
        error: Option<RpcError>,
        body: String,
    },

    #[error("upstream protocol error: {0}")]
    Protocol(String),

    #[error("upstream error: {0}")]
    Application(RpcError),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl UpstreamError {
    /// The structured protocol error carried by this failure, if any.
    pub fn rpc_error(&self) -> Option<&RpcError> {
        match self {
            Self::Application(err) => Some(err),
            Self::HttpStatus { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// Converts the failure into the error object returned to the local client.
    ///
    /// Structured upstream errors pass through untouched.
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            Self::Application(err) => err,
            Self::HttpStatus {
                error: Some(err), ..
            } => err,
            Self::HttpStatus {
                status,
                error: None,
                body,
            } => {
                let message = if body.trim().is_empty() {
                    format!("Upstream returned HTTP {status}")
                } else {
                    format!("Upstream returned HTTP {status}: {}", body.trim())
                };
                RpcError::new(INTERNAL_ERROR, message)
                    .with_data(json!({"kind": "http_status", "status": status}))
            }
            Self::Network(msg) => {
                RpcError::new(INTERNAL_ERROR, format!("Upstream request failed: {msg}"))
                    .with_data(json!({"kind": "network"}))
            }
            Self::Timeout => RpcError::new(INTERNAL_ERROR, "Upstream request timed out")
                .with_data(json!({"kind": "timeout"})),
            Self::Protocol(msg) => {
                RpcError::new(INTERNAL_ERROR, format!("Upstream protocol error: {msg}"))
                    .with_data(json!({"kind": "protocol"}))
            }
        }
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caused by a missing, expired or otherwise invalid session; worth one
    /// recovery cycle.
    Session,
    Other,
}

const SESSION_MARKERS: [&str; 3] = ["session", "not initialized", "expired"];

/// Decides whether a failure was caused by session loss.
///
/// The upstream has no structured error taxonomy, so this matches on HTTP
/// status, a sentinel code and message wording.
pub fn classify(err: &UpstreamError) -> ErrorClass {
    if let UpstreamError::HttpStatus { status: 401 | 406, .. } = err {
        return ErrorClass::Session;
    }
    match err.rpc_error() {
        Some(rpc) if is_session_rpc_error(rpc) => ErrorClass::Session,
        _ => ErrorClass::Other,
    }
}

pub fn is_session_rpc_error(err: &RpcError) -> bool {
    if err.code == INVALID_SESSION {
        return true;
    }
    let message = err.message.to_lowercase();
    SESSION_MARKERS.iter().any(|marker| message.contains(marker))
}
