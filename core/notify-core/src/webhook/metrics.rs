//! In-process delivery counters.
//!
//! Metrics are process-local and reset with each hook invocation; they exist
//! for logging a summary and for tests, not for export.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::circuit_breaker::CircuitState;
use crate::types::Status;

/// Number of recent latencies kept for the rolling average.
pub const LATENCY_WINDOW: usize = 100;

#[derive(Debug)]
struct Counters {
    total_requests: u64,
    successes: u64,
    failures: u64,
    rate_limited: u64,
    circuit_opened: u64,
    success_by_status: HashMap<Status, u64>,
    latencies: VecDeque<Duration>,
    circuit_state: CircuitState,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            total_requests: 0,
            successes: 0,
            failures: 0,
            rate_limited: 0,
            circuit_opened: 0,
            success_by_status: HashMap::new(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            circuit_state: CircuitState::Closed,
        }
    }
}

#[derive(Debug, Default)]
pub struct Metrics {
    inner: Mutex<Counters>,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    /// Sends dropped by the rate limiter.
    pub rate_limited: u64,
    /// Sends rejected because the circuit was open.
    pub circuit_opened: u64,
    pub success_by_status: HashMap<Status, u64>,
    pub average_latency: Duration,
    pub circuit_state: CircuitState,
}

impl MetricsSnapshot {
    /// Successes as a percentage of attempted requests.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_requests as f64 * 100.0
        }
    }
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.lock().total_requests += 1;
    }

    pub fn record_success(&self, status: Status, latency: Duration) {
        let mut inner = self.lock();
        inner.successes += 1;
        *inner.success_by_status.entry(status).or_insert(0) += 1;
        push_latency(&mut inner.latencies, latency);
    }

    pub fn record_failure(&self, latency: Duration) {
        let mut inner = self.lock();
        inner.failures += 1;
        push_latency(&mut inner.latencies, latency);
    }

    pub fn record_rate_limited(&self) {
        self.lock().rate_limited += 1;
    }

    pub fn record_circuit_open(&self) {
        self.lock().circuit_opened += 1;
    }

    pub fn set_circuit_state(&self, state: CircuitState) {
        self.lock().circuit_state = state;
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let average_latency = if inner.latencies.is_empty() {
            Duration::ZERO
        } else {
            inner.latencies.iter().sum::<Duration>() / inner.latencies.len() as u32
        };

        MetricsSnapshot {
            total_requests: inner.total_requests,
            successes: inner.successes,
            failures: inner.failures,
            rate_limited: inner.rate_limited,
            circuit_opened: inner.circuit_opened,
            success_by_status: inner.success_by_status.clone(),
            average_latency,
            circuit_state: inner.circuit_state,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_latency(latencies: &mut VecDeque<Duration>, latency: Duration) {
    if latencies.len() == LATENCY_WINDOW {
        latencies.pop_front();
    }
    latencies.push_back(latency);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_success_rate() {
        let metrics = Metrics::new();
        for _ in 0..4 {
            metrics.record_request();
        }
        metrics.record_success(Status::TaskComplete, Duration::from_millis(10));
        metrics.record_success(Status::TaskComplete, Duration::from_millis(30));
        metrics.record_success(Status::Question, Duration::from_millis(20));
        metrics.record_failure(Duration::from_millis(40));
        metrics.record_rate_limited();
        metrics.record_circuit_open();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 4);
        assert_eq!(snap.successes, 3);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.rate_limited, 1);
        assert_eq!(snap.circuit_opened, 1);
        assert_eq!(snap.success_by_status[&Status::TaskComplete], 2);
        assert_eq!(snap.average_latency, Duration::from_millis(25));
        assert!((snap.success_rate() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_latency_window_keeps_recent_samples() {
        let metrics = Metrics::new();
        for _ in 0..LATENCY_WINDOW {
            metrics.record_failure(Duration::from_secs(10));
        }
        for _ in 0..LATENCY_WINDOW {
            metrics.record_success(Status::TaskComplete, Duration::from_millis(1));
        }
        assert_eq!(metrics.snapshot().average_latency, Duration::from_millis(1));
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = Metrics::new().snapshot();
        assert_eq!(snap.average_latency, Duration::ZERO);
        assert_eq!(snap.success_rate(), 0.0);
        assert_eq!(snap.circuit_state, CircuitState::Closed);
    }
}
