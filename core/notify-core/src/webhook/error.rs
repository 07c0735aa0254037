//! Error types for webhook delivery.

use std::time::Duration;

/// Webhook delivery error variants.
///
/// `RateLimitExceeded` and `CircuitOpen` are admission rejections: nothing was
/// sent and the caller should just drop or log. Everything else means a
/// delivery was attempted (or could not be attempted because of bad input).
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Circuit breaker is open")]
    CircuitOpen,

    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid webhook config: {0}")]
    InvalidConfig(String),

    #[error("Failed to build payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<WebhookError>,
    },

    #[error("Delivery cancelled")]
    Cancelled,

    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    #[error("Async send panicked: {0}")]
    TaskPanicked(String),

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl WebhookError {
    /// True for transient failures worth another attempt:
    /// 5xx, 429, and network-level errors (timeout, DNS, connection refused).
    pub fn is_retryable(&self) -> bool {
        match self {
            WebhookError::Http { status, .. } => *status >= 500 || *status == 429,
            WebhookError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }

    /// True when the request never left the process because of local admission control.
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            WebhookError::RateLimitExceeded | WebhookError::CircuitOpen
        )
    }

    /// HTTP status of the final failure, looking through retry wrapping.
    pub fn status(&self) -> Option<u16> {
        match self {
            WebhookError::Http { status, .. } => Some(*status),
            WebhookError::RetriesExhausted { source, .. } => source.status(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> WebhookError {
        WebhookError::Http {
            status,
            body: String::new(),
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(http(500).is_retryable());
        assert!(http(503).is_retryable());
        assert!(http(429).is_retryable());
        assert!(!http(400).is_retryable());
        assert!(!http(404).is_retryable());
        assert!(!WebhookError::InvalidUrl("x".into()).is_retryable());
        assert!(!WebhookError::Cancelled.is_retryable());
    }

    #[test]
    fn test_admission_rejections() {
        assert!(WebhookError::RateLimitExceeded.is_admission_rejection());
        assert!(WebhookError::CircuitOpen.is_admission_rejection());
        assert!(!http(503).is_admission_rejection());
    }

    #[test]
    fn test_status_looks_through_retry_wrapping() {
        let err = WebhookError::RetriesExhausted {
            attempts: 3,
            source: Box::new(http(502)),
        };
        assert_eq!(err.status(), Some(502));
        assert_eq!(WebhookError::Cancelled.status(), None);
    }
}
