//! File logging for the hook binary.
//!
//! Claude Code reads hook stdout, so logs go to
//! `~/.claude-notify/logs/notify-hook.log` through a non-blocking writer.
//! `CLAUDE_NOTIFY_DEBUG_LOG=1` forces debug level; otherwise `RUST_LOG`
//! applies, defaulting to `info`.

use std::env;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEBUG_ENV: &str = "CLAUDE_NOTIFY_DEBUG_LOG";
const LOG_FILE: &str = "notify-hook.log";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed. Returns `None` when the log directory can't
/// be created; the hook then runs without logging.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = notify_core::config::get_notify_dir()?.join("logs");
    fs_err::create_dir_all(&log_dir).ok()?;

    let appender = tracing_appender::rolling::never(&log_dir, LOG_FILE);
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
    if debug_enabled(env::var(DEBUG_ENV).ok().as_deref()) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    matches!(value, Some("1" | "true" | "TRUE" | "yes" | "YES"))
}
