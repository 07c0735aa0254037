//! Serialized per-session record.
//!
//! Timestamps are Unix seconds. Zero and empty fields are omitted on disk so
//! a record only carries what has actually happened in the session.

use serde::{Deserialize, Serialize};

fn is_zero(value: &i64) -> bool {
    *value == 0
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,

    /// Tool that last put the session into an "awaiting interaction" state.
    #[serde(default)]
    pub last_interactive_tool: String,
    #[serde(default, rename = "last_ts")]
    pub last_interactive_ts: i64,
    #[serde(default)]
    pub cwd: String,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_task_complete_ts: i64,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_notification_ts: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_notification_status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_notification_message: String,
}

impl SessionState {
    pub fn new(session_id: &str) -> Self {
        SessionState {
            session_id: session_id.to_string(),
            ..Default::default()
        }
    }
}
