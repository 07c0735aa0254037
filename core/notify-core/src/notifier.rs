//! End-to-end handling of one hook event.
//!
//! ```text
//! early duplicate? ─▶ trigger lock ─▶ question cooldowns ─▶ content lock
//!        ─▶ duplicate message? ─▶ update state ─▶ send ─▶ record ─▶ release
//! ```
//!
//! Delivery problems are reported as an [`Outcome`], never as `Err`: a hook
//! must not fail the editor because a webhook is down. Only local storage
//! failures propagate.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::dedup::DedupManager;
use crate::error::Result;
use crate::state::StateManager;
use crate::types::Status;
use crate::webhook::{Sender, WebhookError};

/// Interval between content lock attempts while another process delivers.
pub const CONTENT_LOCK_POLL: Duration = Duration::from_millis(100);

/// One notification to deliver, as extracted from a hook event.
#[derive(Debug, Clone, Default)]
pub struct NotifyRequest {
    pub session_id: String,
    /// Hook event name; `None` uses the session-wide trigger lock.
    pub event: Option<String>,
    pub status: Status,
    pub message: String,
    pub tool_name: String,
    pub cwd: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressReason {
    QuestionAfterTaskComplete,
    QuestionAfterNotification,
    DuplicateMessage,
    /// Another process kept the content lock for the whole wait.
    ContentLockBusy,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::QuestionAfterTaskComplete => "question right after task completion",
            Self::QuestionAfterNotification => "question right after another notification",
            Self::DuplicateMessage => "same message sent recently",
            Self::ContentLockBusy => "content lock held by another process",
        };
        f.write_str(text)
    }
}

#[derive(Debug)]
pub enum Outcome {
    Sent,
    /// Webhook delivery is turned off; state was still updated.
    Disabled,
    /// Another invocation is already handling this trigger.
    Duplicate,
    Suppressed(SuppressReason),
    /// Rejected locally by the rate limiter or open circuit.
    Dropped(WebhookError),
    Failed(WebhookError),
}

impl Outcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Outcome::Sent)
    }
}

#[derive(Debug)]
pub struct Notifier {
    config: Config,
    dedup: DedupManager,
    state: StateManager,
    sender: Sender,
}

impl Notifier {
    /// Uses lock and state files in the OS temp directory.
    pub fn new(config: Config, sender: Sender) -> Self {
        Self {
            config,
            dedup: DedupManager::new(),
            state: StateManager::new(),
            sender,
        }
    }

    pub fn with_dedup(mut self, dedup: DedupManager) -> Self {
        self.dedup = dedup;
        self
    }

    pub fn with_state(mut self, state: StateManager) -> Self {
        self.state = state;
        self
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn dedup(&self) -> &DedupManager {
        &self.dedup
    }

    pub async fn notify(&self, request: &NotifyRequest) -> Result<Outcome> {
        let sid = request.session_id.as_str();
        let event = request.event.as_deref().filter(|e| !e.is_empty());

        if self.dedup.check_early_duplicate(sid, event) {
            debug!(session_id = sid, ?event, "Early duplicate, skipping");
            return Ok(Outcome::Duplicate);
        }
        if !self.dedup.acquire_lock(sid, event)? {
            debug!(session_id = sid, ?event, "Trigger lock held, skipping");
            return Ok(Outcome::Duplicate);
        }

        if let Some(reason) = self.question_cooldown(request)? {
            info!(session_id = sid, %reason, "Notification suppressed");
            return Ok(Outcome::Suppressed(reason));
        }

        if !self.wait_for_content_lock(sid).await? {
            warn!(session_id = sid, "Gave up waiting for content lock");
            return Ok(Outcome::Suppressed(SuppressReason::ContentLockBusy));
        }

        let outcome = self.deliver_locked(request).await;

        if let Err(e) = self.dedup.release_content_lock(sid) {
            warn!(session_id = sid, error = %e, "Failed to release content lock");
        }
        outcome
    }

    /// Removes stale lock and state files. Failures are logged, not returned.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let locks = self.dedup.cleanup(max_age).unwrap_or_else(|e| {
            warn!(error = %e, "Lock cleanup failed");
            0
        });
        let states = self.state.cleanup(max_age).unwrap_or_else(|e| {
            warn!(error = %e, "State cleanup failed");
            0
        });
        debug!(locks, states, "Cleanup finished");
        locks + states
    }

    fn question_cooldown(&self, request: &NotifyRequest) -> Result<Option<SuppressReason>> {
        if request.status != Status::Question {
            return Ok(None);
        }
        let sid = request.session_id.as_str();
        let settings = &self.config.notifications;

        if self
            .state
            .should_suppress_question(sid, settings.suppress_question_after_task_complete_seconds)?
        {
            return Ok(Some(SuppressReason::QuestionAfterTaskComplete));
        }
        if self.state.should_suppress_question_after_any_notification(
            sid,
            settings.suppress_question_after_any_notification_seconds,
        )? {
            return Ok(Some(SuppressReason::QuestionAfterNotification));
        }
        Ok(None)
    }

    async fn wait_for_content_lock(&self, session_id: &str) -> Result<bool> {
        let deadline = Instant::now() + self.dedup.content_lock_ttl();
        loop {
            if self.dedup.acquire_content_lock(session_id)? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(CONTENT_LOCK_POLL).await;
        }
    }

    async fn deliver_locked(&self, request: &NotifyRequest) -> Result<Outcome> {
        let sid = request.session_id.as_str();

        if self.state.is_duplicate_message(
            sid,
            &request.message,
            self.config.notifications.duplicate_message_window_seconds,
        )? {
            info!(session_id = sid, "Duplicate message, skipping");
            return Ok(Outcome::Suppressed(SuppressReason::DuplicateMessage));
        }

        self.state
            .update_state(sid, request.status, &request.tool_name, &request.cwd)?;

        if !self.sender.is_enabled() {
            debug!(session_id = sid, "Webhook disabled, state updated only");
            return Ok(Outcome::Disabled);
        }

        match self
            .sender
            .send(request.status, &request.message, sid)
            .await
        {
            // Admission rejections never left the process, so they are not recorded.
            Err(e) if e.is_admission_rejection() => Ok(Outcome::Dropped(e)),
            result => {
                self.state
                    .update_last_notification(sid, request.status, &request.message)?;
                Ok(match result {
                    Ok(()) => Outcome::Sent,
                    Err(e) => Outcome::Failed(e),
                })
            }
        }
    }
}
