//! Persisted session token.
//!
//! The token lives in a single plain-text file so a restarted bridge can
//! resume the upstream session. There is no cross-process locking: two
//! bridges sharing the file simply overwrite each other (last writer wins).

use crate::error::Result;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use tracing::debug;

const SESSION_FILE: &str = "session_id";

/// Default location of the token file: the project cache directory, or the
/// system temp directory when no home directory can be resolved.
pub fn default_session_path() -> PathBuf {
    match ProjectDirs::from("com", "AhmaMcp", "ahma_stdio_bridge") {
        Some(dirs) => dirs.cache_dir().join(SESSION_FILE),
        None => std::env::temp_dir().join("ahma_stdio_bridge_session_id"),
    }
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted token. A missing file or blank content means no
    /// session has been recorded yet.
    pub async fn load(&self) -> Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Overwrites the persisted token.
    pub async fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, token.trim()).await?;
        debug!(path = %self.path.display(), "Persisted session token");
        Ok(())
    }

    /// Deletes the persisted token.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Removed persisted session token");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
