//! Exponential backoff with jitter for webhook deliveries.
//!
//! After attempt `n` (1-based) fails with a retryable error, the retryer sleeps
//! `initial * multiplier^(n-1)` capped at `max_backoff`, plus up to 25% jitter.
//! The sleep races the cancellation token.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::WebhookError;
use crate::config::{RetrySettings, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};

const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// When false, the operation runs exactly once.
    pub enabled: bool,

    /// Total executions including the first.
    pub max_attempts: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    pub multiplier: f64,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        enabled: true,
        max_attempts: 3,
        initial_backoff: DEFAULT_INITIAL_BACKOFF,
        max_backoff: DEFAULT_MAX_BACKOFF,
        multiplier: 2.0,
    };

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_attempts: settings.max_attempts.max(1) as u32,
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
            multiplier: Self::DEFAULT.multiplier,
        }
    }

    /// Base wait after attempt `attempt` (1-based) fails, before jitter.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }

    /// Backoff plus uniform jitter in `[0, 0.25 * backoff]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.backoff_for_attempt(attempt);
        let jitter = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        base + base.mul_f64(jitter)
    }

    fn effective_attempts(&self) -> u32 {
        if self.enabled {
            self.max_attempts.max(1)
        } else {
            1
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug, Clone, Default)]
pub struct Retryer {
    config: RetryConfig,
}

impl Retryer {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails permanently, attempts run out,
    /// or `cancel` fires.
    pub async fn run<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, WebhookError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WebhookError>>,
    {
        let max_attempts = self.config.effective_attempts();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(WebhookError::Cancelled);
            }

            attempt += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !err.is_retryable() || cancel.is_cancelled() {
                return Err(wrap(err, attempt));
            }
            if attempt >= max_attempts {
                return Err(wrap(err, attempt));
            }

            let delay = self.config.delay_for_attempt(attempt);
            debug!(target: "webhook", attempt, ?delay, error = %err, "Retrying webhook delivery");

            tokio::select! {
                _ = cancel.cancelled() => return Err(WebhookError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn wrap(err: WebhookError, attempts: u32) -> WebhookError {
    if attempts > 1 {
        WebhookError::RetriesExhausted {
            attempts,
            source: Box::new(err),
        }
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn http(status: u16) -> WebhookError {
        WebhookError::Http {
            status,
            body: String::new(),
        }
    }

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            ..RetryConfig::DEFAULT
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig::DEFAULT;
        assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.backoff_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.backoff_for_attempt(4), Duration::from_secs(8));
        assert_eq!(config.backoff_for_attempt(5), Duration::from_secs(10));
        assert_eq!(config.backoff_for_attempt(50), Duration::from_secs(10));
    }

    #[test]
    fn test_jittered_delay_bounds() {
        let config = RetryConfig::DEFAULT;
        for _ in 0..200 {
            let second = config.delay_for_attempt(2);
            assert!(second >= Duration::from_secs(2));
            assert!(second <= Duration::from_millis(2500));

            let third = config.delay_for_attempt(3);
            assert!(third >= Duration::from_secs(4));
            assert!(third <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_from_settings_clamps_attempts() {
        let settings = RetrySettings {
            max_attempts: 0,
            ..RetrySettings::default()
        };
        assert_eq!(RetryConfig::from_settings(&settings).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let retryer = Retryer::new(config(3));

        let result = retryer
            .run(&CancellationToken::new(), move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(http(503))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = Instant::now();

        let result = Retryer::new(config(5))
            .run(&CancellationToken::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(http(404)) }
            })
            .await;

        assert!(matches!(result, Err(WebhookError::Http { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = Retryer::new(config(3))
            .run(&CancellationToken::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(http(500)) }
            })
            .await;

        match result {
            Err(WebhookError::RetriesExhausted { attempts, source }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, WebhookError::Http { status: 500, .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let retryer = Retryer::new(RetryConfig {
            enabled: false,
            ..RetryConfig::DEFAULT
        });

        let result = retryer
            .run(&CancellationToken::new(), move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(http(503)) }
            })
            .await;

        assert!(matches!(result, Err(WebhookError::Http { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_skips_execution() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = Retryer::default()
            .run(&cancel, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(WebhookError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result = Retryer::new(config(3))
            .run(&cancel, || async { Err::<(), _>(http(503)) })
            .await;

        assert!(matches!(result, Err(WebhookError::Cancelled)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
