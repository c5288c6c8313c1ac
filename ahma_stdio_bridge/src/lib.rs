//! # Ahma Stdio Bridge
//!
//! Connects a local, stdio-only MCP client to a remote MCP server that speaks
//! the Streamable HTTP transport.
//!
//! ## Architecture
//!
//! *   **Local transport** ([`stdio`]): newline-delimited JSON-RPC on stdin/stdout.
//! *   **Dispatch** ([`dispatch`]): a fixed method table. `initialize` and `ping`
//!     are answered locally, the synthetic `reset_session` tool clears session
//!     state, everything else is forwarded.
//! *   **Request bridge** ([`bridge`]): ensures a session, sends, and on a session
//!     error re-establishes the session and resends exactly once.
//! *   **Session** ([`session`]): the upstream `mcp-session-id`, its handshake, and
//!     its persisted copy.
//! *   **Upstream** ([`upstream`]): HTTP POST returning either a JSON document or
//!     an event stream.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ahma_stdio_bridge::{BridgeConfig, run_stdio};
//! use url::Url;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::new(Url::parse("https://mcp.example.com/mcp")?);
//!     run_stdio(config).await?;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod stdio;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;

pub use bridge::RequestBridge;
pub use config::{BridgeConfig, Cli};
pub use dispatch::Dispatcher;
pub use error::{BridgeError, ErrorClass, Result, UpstreamError, classify};
pub use session::{SessionContext, SessionManager, SessionPhase, SessionStore};
pub use upstream::{HttpUpstream, Upstream};

use std::sync::Arc;
use tracing::info;

/// Wires the session, transport and dispatch table together.
pub async fn build_dispatcher(config: &BridgeConfig) -> Result<Dispatcher> {
    let store = SessionStore::new(&config.session_file);
    let context = Arc::new(SessionContext::load(store, config.session_id.clone()).await);
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(config, context.clone())?);
    let manager = SessionManager::new(context, upstream.clone());
    Ok(Dispatcher::new(RequestBridge::new(manager, upstream)))
}

/// Runs the bridge on this process's stdin/stdout until stdin closes.
pub async fn run_stdio(config: BridgeConfig) -> Result<()> {
    info!(
        endpoint = %config.endpoint,
        session_file = %config.session_file.display(),
        timeout_ms = config.request_timeout.as_millis() as u64,
        "Starting stdio bridge"
    );
    let dispatcher = Arc::new(build_dispatcher(&config).await?);
    stdio::serve(dispatcher, tokio::io::stdin(), tokio::io::stdout()).await
}
