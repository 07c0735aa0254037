//! Hook event handler.
//!
//! Reads the hook JSON from stdin, combines it with the command-line status,
//! and runs the notifier once. Delivery failures are logged and swallowed so
//! the hook never blocks Claude Code; config and storage errors are returned.

use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;

use notify_core::{
    load_config, resolve_config_path, Notifier, NotifyRequest, Outcome, Sender, Status,
};
use serde::Deserialize;

/// Upper bound on waiting for in-flight sends before the process exits.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Fields notify-hook reads from the hook payload. Everything else is ignored.
#[derive(Debug, Default, Deserialize)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub hook_event_name: Option<String>,
    pub cwd: Option<String>,
    pub tool_name: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HandleArgs {
    pub status: String,
    pub event: Option<String>,
    pub message: Option<String>,
    pub config: Option<PathBuf>,
}

pub fn run(args: &HandleArgs) -> Result<(), String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;

    let hook_input = parse_hook_input(&input)?;
    let Some(request) = build_request(args, hook_input)? else {
        return Ok(());
    };

    let config_path = resolve_config_path(args.config.as_deref())?;
    let config = load_config(&config_path)?;
    let sender = Sender::new(&config).map_err(|e| e.to_string())?;
    let notifier = Notifier::new(config, sender);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    runtime.block_on(deliver(&notifier, &request))
}

fn parse_hook_input(input: &str) -> Result<HookInput, String> {
    if input.trim().is_empty() {
        return Ok(HookInput::default());
    }
    serde_json::from_str(input).map_err(|e| format!("Failed to parse hook input: {}", e))
}

/// Merges flags over the hook payload. `None` when there is no session to
/// attribute the notification to.
fn build_request(args: &HandleArgs, input: HookInput) -> Result<Option<NotifyRequest>, String> {
    let status: Status = args.status.parse()?;

    let Some(session_id) = input.session_id.filter(|id| !id.trim().is_empty()) else {
        tracing::debug!(status = %status, "Skipping event (missing session_id)");
        return Ok(None);
    };

    let message = args
        .message
        .clone()
        .or(input.message)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| status.default_title().to_string());

    Ok(Some(NotifyRequest {
        session_id,
        event: args.event.clone().or(input.hook_event_name),
        status,
        message,
        tool_name: input.tool_name.unwrap_or_default(),
        cwd: input.cwd.unwrap_or_default(),
    }))
}

async fn deliver(notifier: &Notifier, request: &NotifyRequest) -> Result<(), String> {
    let outcome = notifier.notify(request).await?;
    let session_id = request.session_id.as_str();

    match &outcome {
        Outcome::Sent => tracing::info!(session_id, status = %request.status, "Notification sent"),
        Outcome::Disabled | Outcome::Duplicate => {
            tracing::debug!(session_id, ?outcome, "Notification not sent")
        }
        Outcome::Suppressed(reason) => {
            tracing::info!(session_id, %reason, "Notification suppressed")
        }
        Outcome::Dropped(e) => tracing::warn!(session_id, error = %e, "Notification dropped"),
        Outcome::Failed(e) => tracing::error!(session_id, error = %e, "Notification failed"),
    }

    if let Err(e) = notifier.sender().shutdown(SHUTDOWN_TIMEOUT).await {
        tracing::warn!(error = %e, "Sender shutdown incomplete");
    }

    let metrics = notifier.sender().metrics();
    tracing::debug!(
        requests = metrics.total_requests,
        successes = metrics.successes,
        failures = metrics.failures,
        "Delivery metrics"
    );
    Ok(())
}
