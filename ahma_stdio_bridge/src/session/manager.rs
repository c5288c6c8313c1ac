use super::context::{SessionContext, SessionPhase};
use crate::error::{ErrorClass, UpstreamError, classify};
use crate::protocol::{
    JsonRpcNotification, JsonRpcRequest, PROTOCOL_VERSION, ResponseEnvelope, RpcError,
};
use crate::upstream::Upstream;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CLIENT_NAME: &str = "ahma_stdio_bridge";

type HandshakeFuture = Shared<BoxFuture<'static, Result<(), UpstreamError>>>;

/// Owns the upstream handshake.
///
/// Concurrent callers of [`SessionManager::ensure_ready`] share a single
/// outstanding handshake: the first caller starts it, everyone else awaits
/// the same future and observes the same outcome.
pub struct SessionManager {
    context: Arc<SessionContext>,
    upstream: Arc<dyn Upstream>,
    pending: Mutex<Option<HandshakeFuture>>,
}

impl SessionManager {
    pub fn new(context: Arc<SessionContext>, upstream: Arc<dyn Upstream>) -> Arc<Self> {
        Arc::new(Self {
            context,
            upstream,
            pending: Mutex::new(None),
        })
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Makes sure a usable upstream session exists, performing the handshake
    /// if needed.
    pub async fn ensure_ready(self: &Arc<Self>) -> Result<(), UpstreamError> {
        let attempt = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(attempt) = pending.as_ref() {
                attempt.clone()
            } else if self.context.phase() == SessionPhase::Ready {
                return Ok(());
            } else {
                let manager = Arc::clone(self);
                let attempt = async move { manager.run_handshake().await }
                    .boxed()
                    .shared();
                self.context.set_phase(SessionPhase::Initializing);
                *pending = Some(attempt.clone());
                attempt
            }
        };
        attempt.await
    }

    /// Forgets the in-memory session. Persisted state is untouched.
    pub fn invalidate(&self) {
        self.context.invalidate();
    }

    /// Forgets the session in memory and on disk.
    pub async fn reset(&self) {
        self.context.clear().await;
    }

    /// Forgets the session after a request sent with `stale` was rejected,
    /// unless the session has been replaced since.
    pub async fn recover_from(&self, stale: Option<&str>) {
        if !self.context.clear_if_current(stale).await {
            debug!(stale = ?stale, "Session already renewed by a concurrent call");
        }
    }

    async fn run_handshake(self: Arc<Self>) -> Result<(), UpstreamError> {
        let mut outcome = self.handshake_once().await;
        if let Err(err) = &outcome
            && classify(err) == ErrorClass::Session
        {
            warn!(
                "Handshake rejected with session error, retrying with a fresh session: {}",
                err
            );
            self.context.discard().await;
            outcome = self.handshake_once().await;
        }

        self.context.set_phase(match outcome {
            Ok(()) => SessionPhase::Ready,
            Err(_) => SessionPhase::Uninitialized,
        });
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) = None;

        match &outcome {
            Ok(()) => info!(session_id = ?self.context.token(), "Upstream session ready"),
            Err(err) => warn!("Upstream handshake failed: {}", err),
        }
        outcome
    }

    async fn handshake_once(&self) -> Result<(), UpstreamError> {
        let request = JsonRpcRequest::new("initialize", initialize_params());
        debug!(id = %request.id, "Sending initialize");

        match self.upstream.send(&request).await {
            Ok(ResponseEnvelope::Result(_)) => {}
            Ok(ResponseEnvelope::Error(err)) if is_already_initialized(&err) => {
                info!("Upstream reports session already initialized");
            }
            Ok(ResponseEnvelope::Error(err)) => return Err(UpstreamError::Application(err)),
            Err(err) if err.rpc_error().is_some_and(is_already_initialized) => {
                info!("Upstream reports session already initialized");
            }
            Err(err) => return Err(err),
        }

        let initialized = JsonRpcNotification::new("notifications/initialized");
        if let Err(err) = self.upstream.notify(&initialized).await {
            warn!("Failed to deliver notifications/initialized: {}", err);
        }
        Ok(())
    }
}

fn is_already_initialized(err: &RpcError) -> bool {
    err.message.to_lowercase().contains("already initialized")
}

/// Parameters of the upstream `initialize` request. The client name carries a
/// fresh suffix per attempt so the upstream allocates a new session.
fn initialize_params() -> Value {
    let suffix = Uuid::new_v4().simple().to_string();
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": format!("{CLIENT_NAME}-{}", &suffix[..8]),
            "version": env!("CARGO_PKG_VERSION"),
        }
    })
}
