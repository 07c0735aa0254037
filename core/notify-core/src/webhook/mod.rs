//! Webhook delivery with rate limiting, circuit breaking, and retries.
//!
//! [`Sender`] is the entry point. The other components are usable on their
//! own and are exported for tests and for callers composing their own pipeline.

mod circuit_breaker;
mod error;
mod formatters;
mod metrics;
mod rate_limiter;
mod retry;
mod sender;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error::WebhookError;
pub use formatters::{
    formatter_for_preset, DiscordFormatter, Formatter, LarkFormatter, SlackFormatter,
    TelegramFormatter,
};
pub use metrics::{Metrics, MetricsSnapshot, LATENCY_WINDOW};
pub use rate_limiter::RateLimiter;
pub use retry::{RetryConfig, Retryer};
pub use sender::{validate_url, Sender, HTTP_TIMEOUT, MAX_RESPONSE_BODY};
