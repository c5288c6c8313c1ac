//! Static method table for calls arriving from the local client.
//!
//! The supported method set is fixed: a handful of methods are answered
//! locally, the rest are forwarded through the [`RequestBridge`]. One synthetic
//! tool, [`RESET_TOOL_NAME`], is advertised alongside the upstream's tools and
//! handled here without contacting the upstream.

use crate::bridge::RequestBridge;
use crate::protocol::{INTERNAL_ERROR, PROTOCOL_VERSION, RpcError};
use serde_json::{Value, json};
use tracing::info;

pub const RESET_TOOL_NAME: &str = "reset_session";
pub const RESET_CONFIRMATION: &str =
    "Session reset. A new upstream session will be established on the next request.";

/// Methods relayed to the upstream unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardedMethod {
    ListTools,
    CallTool,
    ListResources,
    ReadResource,
    ListPrompts,
    GetPrompt,
    Complete,
    SetLogLevel,
}

impl ForwardedMethod {
    pub const ALL: [Self; 8] = [
        Self::ListTools,
        Self::CallTool,
        Self::ListResources,
        Self::ReadResource,
        Self::ListPrompts,
        Self::GetPrompt,
        Self::Complete,
        Self::SetLogLevel,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ListTools => "tools/list",
            Self::CallTool => "tools/call",
            Self::ListResources => "resources/list",
            Self::ReadResource => "resources/read",
            Self::ListPrompts => "prompts/list",
            Self::GetPrompt => "prompts/get",
            Self::Complete => "completion/complete",
            Self::SetLogLevel => "logging/setLevel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

/// How a client method is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Initialize,
    Ping,
    Forward(ForwardedMethod),
}

impl Route {
    pub fn for_method(method: &str) -> Option<Self> {
        match method {
            "initialize" => Some(Self::Initialize),
            "ping" => Some(Self::Ping),
            other => ForwardedMethod::from_name(other).map(Self::Forward),
        }
    }
}

/// Tool descriptor appended to every `tools/list` result.
pub fn reset_tool_descriptor() -> Value {
    json!({
        "name": RESET_TOOL_NAME,
        "description": "Discard the current upstream session (in memory and on disk). \
                        The next request performs a fresh handshake.",
        "inputSchema": {
            "type": "object",
            "properties": {}
        }
    })
}

fn reset_confirmation() -> Value {
    json!({
        "content": [{"type": "text", "text": RESET_CONFIRMATION}],
        "isError": false
    })
}

pub struct Dispatcher {
    bridge: RequestBridge,
}

impl Dispatcher {
    pub fn new(bridge: RequestBridge) -> Self {
        Self { bridge }
    }

    /// Serves one client request.
    pub async fn handle(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let route = Route::for_method(method).ok_or_else(|| RpcError::method_not_found(method))?;
        match route {
            Route::Initialize => Ok(local_initialize_result(&params)),
            Route::Ping => Ok(json!({})),
            Route::Forward(ForwardedMethod::CallTool) if is_reset_call(&params) => {
                info!("Resetting upstream session on client request");
                self.bridge.session().reset().await;
                Ok(reset_confirmation())
            }
            Route::Forward(ForwardedMethod::ListTools) => {
                let result = self.forward(ForwardedMethod::ListTools, params).await?;
                append_reset_tool(result)
            }
            Route::Forward(forwarded) => self.forward(forwarded, params).await,
        }
    }

    async fn forward(&self, method: ForwardedMethod, params: Value) -> Result<Value, RpcError> {
        self.bridge
            .forward(method.as_str(), params)
            .await
            .map_err(|e| e.into_rpc_error())
    }
}

fn is_reset_call(params: &Value) -> bool {
    params.get("name").and_then(Value::as_str) == Some(RESET_TOOL_NAME)
}

fn append_reset_tool(mut result: Value) -> Result<Value, RpcError> {
    let Some(object) = result.as_object_mut() else {
        return Err(RpcError::new(
            INTERNAL_ERROR,
            "Upstream tools/list result is not an object",
        ));
    };
    match object.entry("tools").or_insert_with(|| json!([])) {
        Value::Array(tools) => tools.push(reset_tool_descriptor()),
        _ => {
            return Err(RpcError::new(
                INTERNAL_ERROR,
                "Upstream tools/list result has a non-array `tools` field",
            ));
        }
    }
    Ok(result)
}

/// Answer to the local client's own `initialize`. The upstream handshake is
/// separate and happens lazily on the first forwarded call.
fn local_initialize_result(params: &Value) -> Value {
    let protocol_version = params
        .get("protocolVersion")
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);
    json!({
        "protocolVersion": protocol_version,
        "capabilities": {
            "tools": {},
            "resources": {},
            "prompts": {},
            "completions": {},
            "logging": {}
        },
        "serverInfo": {
            "name": "ahma_stdio_bridge",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}
