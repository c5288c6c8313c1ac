use super::store::SessionStore;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Lifecycle of the one upstream session owned by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No handshake has been performed (or state was reset).
    Uninitialized,
    /// A handshake is in flight.
    Initializing,
    /// The session may be used for forwarded requests.
    Ready,
    /// The upstream rejected the session; a new handshake is required.
    Invalid,
}

#[derive(Debug)]
struct SessionState {
    token: Option<String>,
    phase: SessionPhase,
}

/// Process-wide session state shared by the manager and the transport.
///
/// The mutex is never held across an await point.
#[derive(Debug)]
pub struct SessionContext {
    state: Mutex<SessionState>,
    store: SessionStore,
}

impl SessionContext {
    /// Creates the context. A preloaded token (fixed configuration or a
    /// previously persisted one) is trusted until the upstream rejects it.
    pub fn new(store: SessionStore, token: Option<String>) -> Self {
        let phase = if token.is_some() {
            SessionPhase::Ready
        } else {
            SessionPhase::Uninitialized
        };
        Self {
            state: Mutex::new(SessionState { token, phase }),
            store,
        }
    }

    /// Builds the context from `fixed` if given, otherwise from the store.
    pub async fn load(store: SessionStore, fixed: Option<String>) -> Self {
        let token = match fixed.filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                info!("Using configured upstream session id");
                Some(token.trim().to_string())
            }
            None => match store.load().await {
                Ok(Some(token)) => {
                    info!(path = %store.path().display(), "Resuming persisted upstream session");
                    Some(token)
                }
                Ok(None) => None,
                Err(e) => {
                    warn!(
                        path = %store.path().display(),
                        "Failed to read persisted session: {}",
                        e
                    );
                    None
                }
            },
        };
        Self::new(store, token)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        self.lock().phase = phase;
    }

    /// Records a session token advertised by the upstream.
    ///
    /// Any response may assign or rotate the session, so this is called for
    /// every response regardless of status or body format.
    pub async fn observe_token(&self, token: &str) {
        let token = token.trim();
        if token.is_empty() {
            return;
        }
        let changed = {
            let mut state = self.lock();
            let changed = state.token.as_deref() != Some(token);
            state.token = Some(token.to_string());
            if matches!(
                state.phase,
                SessionPhase::Uninitialized | SessionPhase::Invalid
            ) {
                state.phase = SessionPhase::Ready;
            }
            changed
        };
        if changed {
            info!(session_id = %token, "Upstream assigned session");
            if let Err(e) = self.store.save(token).await {
                warn!(
                    path = %self.store.path().display(),
                    "Failed to persist session token: {}",
                    e
                );
            }
        }
    }

    /// Drops the in-memory token. Persisted state is left alone.
    ///
    /// No-op while a handshake is in flight: the token it stores replaces the
    /// one being invalidated.
    pub fn invalidate(&self) {
        let mut state = self.lock();
        if state.phase == SessionPhase::Initializing {
            debug!("Handshake in flight, keeping its session");
            return;
        }
        state.token = None;
        state.phase = SessionPhase::Invalid;
    }

    /// Drops the in-memory token and deletes the persisted copy.
    ///
    /// No-op while a handshake is in flight, for the same reason as
    /// [`SessionContext::invalidate`].
    pub async fn clear(&self) {
        let current = self.token();
        self.clear_if_current(current.as_deref()).await;
    }

    /// Clears the session only if it still holds `expected`, the token a
    /// failed request was sent with.
    ///
    /// Returns `false` when the session has already been replaced (or a
    /// handshake replacing it is in flight); the caller can retry right away.
    pub async fn clear_if_current(&self, expected: Option<&str>) -> bool {
        {
            let mut state = self.lock();
            if state.phase == SessionPhase::Initializing || state.token.as_deref() != expected {
                debug!(
                    expected = ?expected,
                    current = ?state.token,
                    "Session already replaced, not clearing"
                );
                return false;
            }
            state.token = None;
            state.phase = SessionPhase::Uninitialized;
        }
        self.remove_persisted().await;
        true
    }

    /// Drops the token in memory and on disk without touching the phase.
    /// Used by the handshake itself when the upstream rejects its session.
    pub(crate) async fn discard(&self) {
        self.lock().token = None;
        self.remove_persisted().await;
    }

    async fn remove_persisted(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(
                path = %self.store.path().display(),
                "Failed to remove persisted session token: {}",
                e
            );
        }
    }
}
