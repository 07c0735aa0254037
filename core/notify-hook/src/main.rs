//! notify-hook: Claude Code hook handler that sends webhook notifications.
//!
//! Called from hooks configured in ~/.claude/settings.json, e.g.
//! `notify-hook handle --status task_complete` on `Stop`.
//!
//! ## Subcommands
//!
//! - `handle`: Deliver one notification, reads the hook JSON from stdin
//! - `cleanup`: Remove stale lock and session state files

mod handle;
mod logging;

use clap::{Parser, Subcommand};
use notify_core::{DedupManager, StateManager};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "notify-hook")]
#[command(about = "Webhook notifications for Claude Code")]
#[command(version)]
struct Cli {
    /// Config file (defaults to $CLAUDE_NOTIFY_CONFIG or ~/.claude-notify/config.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a hook event (reads JSON from stdin)
    Handle {
        /// Notification status (task_complete, question, plan_ready, ...)
        #[arg(long)]
        status: String,

        /// Hook event name, overrides hook_event_name from stdin
        #[arg(long)]
        event: Option<String>,

        /// Message text, overrides message from stdin
        #[arg(long)]
        message: Option<String>,
    },

    /// Remove lock and state files older than the given age
    Cleanup {
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Handle {
            status,
            event,
            message,
        } => {
            let args = handle::HandleArgs {
                status,
                event,
                message,
                config: cli.config,
            };
            if let Err(e) = handle::run(&args) {
                tracing::error!(error = %e, "notify-hook handle failed");
                std::process::exit(1);
            }
        }
        Commands::Cleanup { max_age_secs } => {
            let removed = cleanup(
                &DedupManager::new(),
                &StateManager::new(),
                Duration::from_secs(max_age_secs),
            );
            println!("Removed {} stale files", removed);
        }
    }
}

/// Removes stale lock and state files. A failure in one does not skip the other.
fn cleanup(dedup: &DedupManager, state: &StateManager, max_age: Duration) -> usize {
    let locks = dedup.cleanup(max_age).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Lock cleanup failed");
        0
    });
    let states = state.cleanup(max_age).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "State cleanup failed");
        0
    });
    tracing::info!(locks, states, "Cleanup finished");
    locks + states
}
