//! Three-state circuit breaker (Closed / Open / HalfOpen).
//!
//! Transitions:
//! - Closed -> Open: `failure_threshold` consecutive failures
//! - Open -> HalfOpen: `timeout` elapsed since opening (applied lazily on the next query)
//! - HalfOpen -> Closed: `success_threshold` consecutive successes
//! - HalfOpen -> Open: any failure
//!
//! State lives behind a `std::sync::Mutex` that is never held across the
//! wrapped operation's `.await`.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::WebhookError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric gauge value: 0 closed, 1 open, 2 half-open.
    pub fn as_gauge(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Thresholds of zero are treated as one.
    pub fn new(failure_threshold: u32, success_threshold: u32, timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            timeout,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                opened_at: None,
            }),
        }
    }

    /// Current state, after applying any pending Open -> HalfOpen transition.
    pub fn current_state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.advance(&mut inner);
        inner.state
    }

    /// Consecutive failures counted while Closed.
    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    /// Runs `op` unless the circuit is open, then records its outcome.
    ///
    /// A `Cancelled` outcome is passed through without counting either way.
    pub async fn execute<T, F, Fut>(&self, op: F) -> Result<T, WebhookError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, WebhookError>>,
    {
        if self.current_state() == CircuitState::Open {
            return Err(WebhookError::CircuitOpen);
        }

        let result = op().await;
        match &result {
            Ok(_) => self.record_success(),
            Err(WebhookError::Cancelled) => {}
            Err(_) => self.record_failure(),
        }
        result
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.advance(&mut inner);
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                if inner.successes >= self.success_threshold {
                    transition(&mut inner, CircuitState::Closed);
                    info!(target: "webhook", "Circuit breaker closed after successful probes");
                }
            }
            CircuitState::Open => debug!(target: "webhook", "Success recorded while circuit open"),
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.advance(&mut inner);
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.failure_threshold {
                    let failures = inner.failures;
                    transition(&mut inner, CircuitState::Open);
                    warn!(target: "webhook", failures, "Circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                transition(&mut inner, CircuitState::Open);
                warn!(target: "webhook", "Circuit breaker probe failed, reopening");
            }
            CircuitState::Open => {}
        }
    }

    fn advance(&self, inner: &mut BreakerState) {
        if inner.state != CircuitState::Open {
            return;
        }
        let elapsed = inner
            .opened_at
            .map(|at| Instant::now().saturating_duration_since(at))
            .unwrap_or(self.timeout);
        if elapsed >= self.timeout {
            transition(inner, CircuitState::HalfOpen);
            debug!(target: "webhook", "Circuit breaker half-open");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn transition(inner: &mut BreakerState, to: CircuitState) {
    inner.state = to;
    inner.failures = 0;
    inner.successes = 0;
    inner.opened_at = (to == CircuitState::Open).then(Instant::now);
}
