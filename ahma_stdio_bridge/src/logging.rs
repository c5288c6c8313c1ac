//! # Logging Initialization
//!
//! stdout carries the protocol, so logs go either to a daily rolling file in
//! the project cache directory (default) or to stderr (`--log-to-stderr`).
//! When the cache directory cannot be written, logging falls back to stderr.
//!
//! Verbosity comes from `RUST_LOG` when set, otherwise from the given level
//! with `debug` for this crate.

use directories::ProjectDirs;
use std::{io::stderr, path::Path, sync::Once};
use tracing_subscriber::{EnvFilter, fmt::layer, prelude::*};

static INIT: Once = Once::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_logging(log_level: &str, log_to_file: bool) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},ahma_stdio_bridge=debug")));

        if log_to_file
            && let Some(proj_dirs) = ProjectDirs::from("com", "AhmaMcp", "ahma_stdio_bridge")
        {
            let log_dir = proj_dirs.cache_dir();

            // tracing_appender::rolling::daily panics on permission errors.
            if can_write(log_dir) {
                let file_appender =
                    tracing_appender::rolling::daily(log_dir, "ahma_stdio_bridge.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(layer().with_writer(non_blocking).with_ansi(false))
                    .init();
                // Leaked so buffered lines are flushed on exit.
                Box::leak(Box::new(guard));
                return;
            }
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer().with_writer(stderr).with_ansi(true))
            .init();
    });
}

fn can_write(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = dir.join(".ahma_log_test");
    match std::fs::write(&probe, "test") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}
