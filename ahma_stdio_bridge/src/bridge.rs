//! Forwarding of client calls to the upstream with session recovery.

use crate::error::{ErrorClass, UpstreamError, classify};
use crate::protocol::{JsonRpcRequest, ResponseEnvelope};
use crate::session::SessionManager;
use crate::upstream::Upstream;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Orchestrates one forwarded call: ensure session, send, classify and, for a
/// session error, recover and resend exactly once.
#[derive(Clone)]
pub struct RequestBridge {
    session: Arc<SessionManager>,
    upstream: Arc<dyn Upstream>,
}

impl RequestBridge {
    pub fn new(session: Arc<SessionManager>, upstream: Arc<dyn Upstream>) -> Self {
        Self { session, upstream }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Forwards `method` upstream and returns its result.
    ///
    /// Handshake failures propagate as-is; they already had their own retry.
    /// The error handed back is the one the upstream produced, never a
    /// substitute.
    pub async fn forward(&self, method: &str, params: Value) -> Result<Value, UpstreamError> {
        match self.attempt(method, &params).await {
            Err(Failure::Send { error, session }) if classify(&error) == ErrorClass::Session => {
                warn!(method, "Session error from upstream, re-establishing session: {}", error);
                self.session.recover_from(session.as_deref()).await;
                self.attempt(method, &params)
                    .await
                    .map_err(Failure::into_inner)
            }
            outcome => outcome.map_err(Failure::into_inner),
        }
    }

    async fn attempt(&self, method: &str, params: &Value) -> Result<Value, Failure> {
        self.session
            .ensure_ready()
            .await
            .map_err(Failure::Handshake)?;

        let request = JsonRpcRequest::new(method, params.clone());
        let session = self.session.context().token();
        debug!(method, id = %request.id, "Forwarding request");
        let error = match self.upstream.send(&request).await {
            Ok(ResponseEnvelope::Result(result)) => return Ok(result),
            Ok(ResponseEnvelope::Error(err)) => UpstreamError::Application(err),
            Err(err) => err,
        };
        Err(Failure::Send { error, session })
    }
}

enum Failure {
    Handshake(UpstreamError),
    /// The send failed; `session` is the token the request went out with.
    Send {
        error: UpstreamError,
        session: Option<String>,
    },
}

impl Failure {
    fn into_inner(self) -> UpstreamError {
        match self {
            Self::Handshake(error) | Self::Send { error, .. } => error,
        }
    }
}
