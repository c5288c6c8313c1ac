//! Upstream session lifecycle.
//!
//! ## Overview
//!
//! The bridge owns exactly one upstream session per process. Its identifier
//! is assigned by the remote server (the `mcp-session-id` response header),
//! persisted to disk so a restarted bridge can resume it, and dropped when
//! the upstream reports that it is no longer valid.
//!
//! ## Phases
//!
//! ```text
//! Uninitialized ──ensure_ready──▶ Initializing ──ok──▶ Ready
//!       ▲                              │                 │
//!       └────────────failed────────────┘    session error│
//!                                                        ▼
//!                         Initializing ◀──ensure_ready── Invalid
//! ```
//!
//! Observing a session header moves `Uninitialized`/`Invalid` straight to
//! `Ready`. The reset tool clears everything back to `Uninitialized`.
//!
//! Recovery after a failed request only clears the session if it still holds
//! the token that request was sent with. A call whose stale token has already
//! been replaced by a concurrent recovery just retries with the new one, and
//! nothing clears the session while a handshake is in flight.
//!
//! ## Known limitation
//!
//! The token file is shared by every bridge process using the same path and
//! is not locked: the last writer wins.

mod context;
mod manager;
mod store;

pub use context::{SessionContext, SessionPhase};
pub use manager::SessionManager;
pub use store::{SessionStore, default_session_path};
