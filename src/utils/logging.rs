//! Tracing subscriber setup

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "ytfront=info,tower_http=info";

/// File name of the log written under [`resolve_log_dir`] with `local-logging`
pub const LOG_FILE_NAME: &str = "backend.log";

pub fn local_logging_enabled() -> bool {
    cfg!(feature = "local-logging")
}

pub fn resolve_log_dir() -> Result<PathBuf, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Failed to resolve current directory: {e}"))?;
    Ok(cwd.join("log"))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber; later calls are no-ops
pub fn init_tracing() {
    #[cfg(feature = "local-logging")]
    {
        if init_file_tracing().is_ok() {
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();
}

#[cfg(feature = "local-logging")]
fn init_file_tracing() -> Result<(), String> {
    use std::sync::OnceLock;
    use tracing_appender::non_blocking::WorkerGuard;

    static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .map_err(|e| format!("Failed to create log directory {}: {e}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME));
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_twice() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_log_dir_under_cwd() {
        let dir = resolve_log_dir().unwrap();
        assert!(dir.ends_with("log"));
        assert_eq!(local_logging_enabled(), cfg!(feature = "local-logging"));
    }
}
