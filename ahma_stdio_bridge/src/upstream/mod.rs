//! Upstream MCP endpoint over Streamable HTTP.
//!
//! One POST per JSON-RPC message. The endpoint may answer with a single JSON
//! document or with an event stream; both are reduced to a
//! [`ResponseEnvelope`]. The `mcp-session-id` response header is captured
//! before status or body are looked at, because the upstream may assign or
//! rotate the session on any response, including failures.

pub mod sse;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, UpstreamError};
use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, PROTOCOL_VERSION, ResponseEnvelope, RpcError,
};
use crate::session::SessionContext;
use async_trait::async_trait;
use reqwest::{
    StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Session header of the MCP 2025-03-26 Streamable HTTP transport.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";
const MCP_PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
const ACCEPT_JSON_OR_STREAM: &str = "application/json, text/event-stream";
const EVENT_STREAM: &str = "text/event-stream";

/// Sends JSON-RPC messages to the remote MCP server.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends a request and waits for its response.
    async fn send(&self, request: &JsonRpcRequest) -> Result<ResponseEnvelope, UpstreamError>;

    /// Sends a one-way notification. Any response body is discarded.
    async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), UpstreamError>;
}

pub struct HttpUpstream {
    client: reqwest::Client,
    endpoint: Url,
    authorization: Option<String>,
    session: Arc<SessionContext>,
}

impl HttpUpstream {
    pub fn new(config: &BridgeConfig, session: Arc<SessionContext>) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| BridgeError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            authorization: config.authorization.clone(),
            session,
        })
    }

    fn post<T: Serialize + ?Sized>(&self, body: &T) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(ACCEPT, ACCEPT_JSON_OR_STREAM)
            .header(MCP_PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .json(body);
        if let Some(authorization) = &self.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(session_id) = self.session.token() {
            request = request.header(MCP_SESSION_ID_HEADER, session_id);
        }
        request
    }

    async fn capture_session(&self, headers: &HeaderMap) {
        if let Some(session_id) = headers
            .get(MCP_SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            self.session.observe_token(session_id).await;
        }
    }
}

fn is_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.trim_start().starts_with(EVENT_STREAM))
}

/// Builds the error for a non-success status, keeping any JSON-RPC error
/// object the body carries.
pub fn http_status_error(status: StatusCode, body: String) -> UpstreamError {
    let error = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|mut v| v.get_mut("error").map(Value::take))
        .and_then(|e| serde_json::from_value::<RpcError>(e).ok());
    UpstreamError::HttpStatus {
        status: status.as_u16(),
        error,
        body,
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: &JsonRpcRequest) -> Result<ResponseEnvelope, UpstreamError> {
        debug!(method = %request.method, id = %request.id, "Sending upstream request");
        let response = self.post(request).send().await?;
        self.capture_session(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(method = %request.method, status = %status, "Upstream rejected request");
            return Err(http_status_error(status, body));
        }
        if status == StatusCode::ACCEPTED {
            return Err(UpstreamError::Protocol(
                "upstream accepted the request without a response".to_string(),
            ));
        }

        if is_event_stream(response.headers()) {
            debug!(method = %request.method, "Reading event-stream response");
            sse::read_first_answer(response.bytes_stream()).await
        } else {
            let body = response.bytes().await?;
            ResponseEnvelope::from_slice(&body)
        }
    }

    async fn notify(&self, notification: &JsonRpcNotification) -> Result<(), UpstreamError> {
        debug!(method = %notification.method, "Sending upstream notification");
        let response = self.post(notification).send().await?;
        self.capture_session(response.headers()).await;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(http_status_error(status, body));
        }
        Ok(())
    }
}
