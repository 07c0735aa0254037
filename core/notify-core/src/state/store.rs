//! File-backed session state and the suppression policy built on it.
//!
//! One file per session: `claude-session-state-{session}.json`.
//!
//! # Atomic Writes
//!
//! Uses temp file + rename so a reader in another hook process never sees a
//! half-written record. Atomicity covers a single write only; see the module
//! docs of [`crate::state`] for the read-modify-write race.

use fs_err as fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::error::{NotifyError, Result};
use crate::files::{cleanup_old_files, now_secs, remove_if_exists, sanitize_component};
use crate::types::Status;

use super::types::SessionState;

const STATE_PREFIX: &str = "claude-session-state-";
const STATE_SUFFIX: &str = ".json";

/// Normalizes a message for duplicate comparison.
///
/// Trims whitespace, strips trailing periods and lowercases, so
/// "Done." and "done.." compare equal.
pub fn normalize_message(message: &str) -> String {
    message.trim().trim_end_matches('.').to_lowercase()
}

/// Reads and writes per-session state records in one directory.
#[derive(Debug, Clone)]
pub struct StateManager {
    dir: PathBuf,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    /// Manager rooted at the OS temp directory.
    pub fn new() -> Self {
        Self::with_dir(std::env::temp_dir())
    }

    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        StateManager { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn state_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!(
            "{STATE_PREFIX}{}{STATE_SUFFIX}",
            sanitize_component(session_id)
        ))
    }

    /// Loads the record for a session. `Ok(None)` if it was never written.
    pub fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.state_path(session_id);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(NotifyError::io("Failed to read state file", e)),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| NotifyError::json("Failed to parse state file", e))
    }

    pub fn save(&self, state: &SessionState) -> Result<()> {
        let path = self.state_path(&state.session_id);
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| NotifyError::json("Failed to serialize state", e))?;

        let mut temp_file = NamedTempFile::new_in(&self.dir)
            .map_err(|e| NotifyError::io("Failed to create temp state file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| NotifyError::io("Failed to write temp state file", e))?;
        temp_file
            .flush()
            .map_err(|e| NotifyError::io("Failed to flush temp state file", e))?;
        temp_file
            .persist(&path)
            .map_err(|e| NotifyError::io("Failed to write state file", e.error))?;

        Ok(())
    }

    pub fn delete(&self, session_id: &str) -> Result<()> {
        remove_if_exists(&self.state_path(session_id))
            .map_err(|e| NotifyError::io("Failed to delete state file", e))
    }

    fn modify(&self, session_id: &str, apply: impl FnOnce(&mut SessionState)) -> Result<()> {
        let mut state = self
            .load(session_id)?
            .unwrap_or_else(|| SessionState::new(session_id));
        apply(&mut state);
        self.save(&state)
    }

    /// Records that `tool_name` is now waiting on the user in `cwd`.
    pub fn update_interactive_tool(
        &self,
        session_id: &str,
        tool_name: &str,
        cwd: &str,
    ) -> Result<()> {
        let now = now_secs();
        self.modify(session_id, |state| {
            state.last_interactive_tool = tool_name.to_string();
            state.last_interactive_ts = now;
            state.cwd = cwd.to_string();
        })
    }

    pub fn update_task_complete(&self, session_id: &str) -> Result<()> {
        let now = now_secs();
        self.modify(session_id, |state| {
            state.last_task_complete_ts = now;
        })
    }

    pub fn update_last_notification(
        &self,
        session_id: &str,
        status: Status,
        message: &str,
    ) -> Result<()> {
        let now = now_secs();
        self.modify(session_id, |state| {
            state.last_notification_ts = now;
            state.last_notification_status = status.as_str().to_string();
            state.last_notification_message = message.to_string();
        })
    }

    /// Updates the record according to the detected status.
    ///
    /// - `TaskComplete` → task-complete timestamp
    /// - `PlanReady` / `Question` with a tool name → interactive tool
    /// - anything else → no change
    pub fn update_state(
        &self,
        session_id: &str,
        status: Status,
        tool_name: &str,
        cwd: &str,
    ) -> Result<()> {
        match status {
            Status::TaskComplete => self.update_task_complete(session_id),
            Status::PlanReady | Status::Question if !tool_name.is_empty() => {
                self.update_interactive_tool(session_id, tool_name, cwd)
            }
            _ => Ok(()),
        }
    }

    /// True if a question arrives within `cooldown_secs` of a task completion.
    pub fn should_suppress_question(&self, session_id: &str, cooldown_secs: i64) -> Result<bool> {
        if cooldown_secs <= 0 {
            return Ok(false);
        }

        let Some(state) = self.load(session_id)? else {
            return Ok(false);
        };
        if state.last_task_complete_ts == 0 {
            return Ok(false);
        }

        Ok(now_secs() - state.last_task_complete_ts < cooldown_secs)
    }

    /// True if a question arrives within `cooldown_secs` of any notification.
    pub fn should_suppress_question_after_any_notification(
        &self,
        session_id: &str,
        cooldown_secs: i64,
    ) -> Result<bool> {
        if cooldown_secs <= 0 {
            return Ok(false);
        }

        let Some(state) = self.load(session_id)? else {
            return Ok(false);
        };
        if state.last_notification_ts == 0 {
            return Ok(false);
        }

        let elapsed = now_secs() - state.last_notification_ts;
        let suppress = elapsed < cooldown_secs;
        tracing::debug!(
            session = %session_id,
            elapsed_secs = elapsed,
            cooldown_secs,
            last_status = %state.last_notification_status,
            suppress,
            "Question cooldown after last notification"
        );

        Ok(suppress)
    }

    /// True if `message` repeats the last notification within `window_secs`.
    pub fn is_duplicate_message(
        &self,
        session_id: &str,
        message: &str,
        window_secs: i64,
    ) -> Result<bool> {
        if window_secs <= 0 {
            return Ok(false);
        }

        let Some(state) = self.load(session_id)? else {
            return Ok(false);
        };
        if state.last_notification_ts == 0 || state.last_notification_message.is_empty() {
            return Ok(false);
        }

        if now_secs() - state.last_notification_ts > window_secs {
            return Ok(false);
        }

        Ok(normalize_message(message) == normalize_message(&state.last_notification_message))
    }

    /// Removes state files older than `max_age`. Returns the count removed.
    pub fn cleanup(&self, max_age: Duration) -> Result<usize> {
        cleanup_old_files(&self.dir, STATE_PREFIX, STATE_SUFFIX, max_age)
    }

    #[cfg(test)]
    pub(crate) fn backdate_for_test(&self, session_id: &str, secs: i64) {
        let mut state = self.load(session_id).unwrap().unwrap();
        for ts in [
            &mut state.last_interactive_ts,
            &mut state.last_task_complete_ts,
            &mut state.last_notification_ts,
        ] {
            if *ts != 0 {
                *ts -= secs;
            }
        }
        self.save(&state).unwrap();
    }
}
