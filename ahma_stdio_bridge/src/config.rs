//! Startup configuration, sourced from command-line flags with environment
//! variable fallbacks.

use crate::error::{BridgeError, Result};
use crate::session::default_session_path;
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Stdio-to-HTTP bridge for remote MCP servers.
///
/// Speaks MCP over stdin/stdout to a single local client and forwards its
/// calls to a Streamable HTTP endpoint, keeping one upstream session alive
/// across calls and restarts.
#[derive(Parser, Debug, Clone)]
#[command(name = "ahma_stdio_bridge")]
#[command(version, about)]
pub struct Cli {
    /// URL of the upstream MCP endpoint.
    #[arg(long, env = "AHMA_UPSTREAM_URL")]
    pub url: String,

    /// Value sent verbatim as the `Authorization` header (e.g. "Bearer ...").
    #[arg(long, env = "AHMA_UPSTREAM_AUTHORIZATION", hide_env_values = true)]
    pub authorization: Option<String>,

    /// Timeout for each upstream HTTP exchange, in milliseconds.
    #[arg(long, env = "AHMA_UPSTREAM_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Upstream session id to start with instead of the persisted one.
    #[arg(long, env = "AHMA_UPSTREAM_SESSION_ID")]
    pub session_id: Option<String>,

    /// File that persists the upstream session id between runs.
    #[arg(long, env = "AHMA_SESSION_FILE")]
    pub session_file: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log to stderr instead of the rolling log file.
    #[arg(long)]
    pub log_to_stderr: bool,
}

/// Validated configuration for the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub endpoint: Url,
    pub authorization: Option<String>,
    pub request_timeout: Duration,
    pub session_id: Option<String>,
    pub session_file: PathBuf,
}

impl BridgeConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            authorization: None,
            request_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            session_id: None,
            session_file: default_session_path(),
        }
    }

    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let endpoint = Url::parse(cli.url.trim())
            .map_err(|e| BridgeError::Config(format!("invalid upstream URL {:?}: {e}", cli.url)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "upstream URL must use http or https, got {}",
                endpoint.scheme()
            )));
        }
        if cli.timeout_ms == 0 {
            return Err(BridgeError::Config(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            endpoint,
            authorization: non_blank(cli.authorization.as_deref()),
            request_timeout: Duration::from_millis(cli.timeout_ms),
            session_id: non_blank(cli.session_id.as_deref()),
            session_file: cli
                .session_file
                .clone()
                .unwrap_or_else(default_session_path),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
