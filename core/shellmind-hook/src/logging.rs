//! File logging for the shellmind binary.
//!
//! stdout and stderr belong to the shell (suggestions, announcements), so
//! every subcommand logs to `~/.shellmind/logs/shellmind.log` instead.
//! `RUST_LOG` picks the filter; `SHELLMIND_DEBUG_LOG=1` forces debug.

use std::env;

use shellmind_core::StorageConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_NAME: &str = "shellmind.log";
const DEBUG_ENV: &str = "SHELLMIND_DEBUG_LOG";

/// Installs the global subscriber. The returned guard flushes buffered
/// lines on drop and must live until the process exits. Returns `None`
/// when the log directory cannot be created; logging is then disabled.
pub fn init(storage: Option<&StorageConfig>) -> Option<WorkerGuard> {
    let dir = storage?.logs_dir();
    if fs_err::create_dir_all(&dir).is_err() {
        return None;
    }

    let appender = tracing_appender::rolling::never(&dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;
    Some(guard)
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
