//! Core types shared by the delivery pipeline and the hook binary.
//!
//! Status classification happens upstream; these types only carry the result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ═══════════════════════════════════════════════════════════════════════════════
// Notification Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of event a notification reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    TaskComplete,
    ReviewComplete,
    Question,
    PlanReady,
    SessionLimitReached,
    ApiError,
    #[default]
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::TaskComplete => "task_complete",
            Status::ReviewComplete => "review_complete",
            Status::Question => "question",
            Status::PlanReady => "plan_ready",
            Status::SessionLimitReached => "session_limit_reached",
            Status::ApiError => "api_error",
            Status::Unknown => "unknown",
        }
    }

    /// Default human-facing title, used when the config has no override.
    pub fn default_title(&self) -> &'static str {
        match self {
            Status::TaskComplete => "✅ Completed",
            Status::ReviewComplete => "🔍 Review",
            Status::Question => "❓ Question",
            Status::PlanReady => "📋 Plan",
            Status::SessionLimitReached => "⏱️ Session Limit Reached",
            Status::ApiError => "🔴 API Error",
            Status::Unknown => "Claude Code",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "task_complete" => Ok(Status::TaskComplete),
            "review_complete" => Ok(Status::ReviewComplete),
            "question" => Ok(Status::Question),
            "plan_ready" => Ok(Status::PlanReady),
            "session_limit_reached" => Ok(Status::SessionLimitReached),
            "api_error" => Ok(Status::ApiError),
            "unknown" => Ok(Status::Unknown),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

/// Presentation data for a status (title shown by formatters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StatusInfo {
    pub title: String,
}

impl StatusInfo {
    pub fn for_status(status: Status) -> Self {
        StatusInfo {
            title: status.default_title().to_string(),
        }
    }
}
