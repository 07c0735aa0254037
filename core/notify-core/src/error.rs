//! Error types for notify-core storage and configuration.
//!
//! Delivery errors live in [`crate::webhook::WebhookError`]; this type covers
//! the local side: lock files, session state files and the config file.

use std::path::PathBuf;

/// All errors that can occur outside the webhook transport.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Configuration file malformed: {path}: {details}")]
    ConfigMalformed { path: PathBuf, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl NotifyError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        NotifyError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        NotifyError::Json {
            context: context.into(),
            source,
        }
    }
}

/// Convenience type alias for Results using NotifyError.
pub type Result<T> = std::result::Result<T, NotifyError>;

impl From<NotifyError> for String {
    fn from(err: NotifyError) -> String {
        err.to_string()
    }
}
