//! Configuration loading for the notification pipeline.
//!
//! The config file is JSON with camelCase keys:
//!
//! ```json
//! {
//!   "notifications": {
//!     "webhook": {
//!       "enabled": true,
//!       "preset": "slack",
//!       "url": "https://hooks.slack.com/services/...",
//!       "retry": {
//!         "enabled": true, "maxAttempts": 3, "initialBackoff": "1s", "maxBackoff": "10s"
//!       },
//!       "circuitBreaker": {
//!         "enabled": true, "failureThreshold": 5, "successThreshold": 2, "timeout": "30s"
//!       },
//!       "rateLimit": { "enabled": true, "requestsPerMinute": 10 }
//!     },
//!     "duplicateMessageWindowSeconds": 180
//!   },
//!   "statuses": { "task_complete": { "title": "Done" } }
//! }
//! ```
//!
//! Duration fields are human-readable strings parsed with `humantime` when the
//! pipeline is built. Unparsable or zero durations fall back to defaults.

use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{NotifyError, Result};
use crate::types::{Status, StatusInfo};

pub const CONFIG_ENV: &str = "CLAUDE_NOTIFY_CONFIG";

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);
pub const DEFAULT_BREAKER_TIMEOUT: Duration = Duration::from_secs(30);

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub notifications: NotificationsConfig,
    /// Per-status title overrides, keyed by status name (`task_complete`, ...).
    pub statuses: HashMap<String, StatusInfo>,
}

impl Config {
    /// Presentation data for a status, honouring overrides from the file.
    pub fn status_info(&self, status: Status) -> StatusInfo {
        self.statuses
            .get(status.as_str())
            .filter(|info| !info.title.is_empty())
            .cloned()
            .unwrap_or_else(|| StatusInfo::for_status(status))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NotificationsConfig {
    pub webhook: WebhookConfig,
    /// Suppress questions this many seconds after a task completes (0 disables).
    pub suppress_question_after_task_complete_seconds: i64,
    /// Suppress questions this many seconds after any notification (0 disables).
    pub suppress_question_after_any_notification_seconds: i64,
    /// Drop a message identical to the previous one within this window (0 disables).
    pub duplicate_message_window_seconds: i64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            webhook: WebhookConfig::default(),
            suppress_question_after_task_complete_seconds: 12,
            suppress_question_after_any_notification_seconds: 7,
            duplicate_message_window_seconds: 180,
        }
    }
}

/// Payload shape used when no preset formatter applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    #[default]
    Json,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WebhookConfig {
    pub enabled: bool,
    /// Formatter name (`slack`, `discord`, `telegram`, `lark`); empty for generic.
    pub preset: String,
    pub url: String,
    /// Telegram chat id, required by the `telegram` preset.
    #[serde(alias = "chatID")]
    pub chat_id: String,
    pub format: PayloadFormat,
    pub headers: HashMap<String, String>,
    pub retry: RetrySettings,
    pub circuit_breaker: CircuitBreakerSettings,
    pub rate_limit: RateLimitSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_attempts: i32,
    pub initial_backoff: String,
    pub max_backoff: String,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_backoff: "1s".to_string(),
            max_backoff: "10s".to_string(),
        }
    }
}

impl RetrySettings {
    pub fn initial_backoff(&self) -> Duration {
        parse_duration_or(&self.initial_backoff, DEFAULT_INITIAL_BACKOFF)
    }

    pub fn max_backoff(&self) -> Duration {
        parse_duration_or(&self.max_backoff, DEFAULT_MAX_BACKOFF)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout: String,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            success_threshold: 2,
            timeout: "30s".to_string(),
        }
    }
}

impl CircuitBreakerSettings {
    pub fn timeout(&self) -> Duration {
        parse_duration_or(&self.timeout, DEFAULT_BREAKER_TIMEOUT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitSettings {
    pub enabled: bool,
    pub requests_per_minute: i64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_minute: 10,
        }
    }
}

/// Parses a human-readable duration ("1s", "500ms"), falling back to
/// `default` when the value is empty, unparsable, or zero.
pub fn parse_duration_or(value: &str, default: Duration) -> Duration {
    match humantime::parse_duration(value.trim()) {
        Ok(duration) if !duration.is_zero() => duration,
        _ => default,
    }
}

/// Returns the directory holding notify-hook's own files (~/.claude-notify).
pub fn get_notify_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude-notify"))
}

/// Resolves the config path: explicit argument, then `CLAUDE_NOTIFY_CONFIG`,
/// then `~/.claude-notify/config.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    get_notify_dir()
        .map(|d| d.join("config.json"))
        .ok_or(NotifyError::HomeDirNotFound)
}

/// Loads the config file, returning defaults if it doesn't exist.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| NotifyError::io(format!("Failed to read config {}", path.display()), e))?;

    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    serde_json::from_str(&content).map_err(|e| NotifyError::ConfigMalformed {
        path: path.to_path_buf(),
        details: e.to_string(),
    })
}
