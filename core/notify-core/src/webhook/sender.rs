//! Webhook sender: admission control, payload building, and delivery.
//!
//! A send passes through the rate limiter and the circuit breaker before any
//! payload is built. Delivery runs the retryer inside the breaker so a whole
//! retry sequence counts as one breaker outcome.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::circuit_breaker::{CircuitBreaker, CircuitState};
use super::error::WebhookError;
use super::formatters::{formatter_for_preset, Formatter};
use super::metrics::{Metrics, MetricsSnapshot};
use super::rate_limiter::RateLimiter;
use super::retry::{RetryConfig, Retryer};
use crate::config::{Config, PayloadFormat, WebhookConfig};
use crate::types::Status;

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Response bodies are read up to this many bytes for error reporting.
pub const MAX_RESPONSE_BODY: usize = 1024 * 1024;

const USER_AGENT: &str = concat!("claude-notify/", env!("CARGO_PKG_VERSION"));

/// Cheap to clone; clones share limiter, breaker, metrics and task tracking.
#[derive(Debug, Clone)]
pub struct Sender {
    inner: Arc<SenderInner>,
}

#[derive(Debug)]
struct SenderInner {
    config: Config,
    client: Client,
    retryer: Retryer,
    breaker: Option<CircuitBreaker>,
    limiter: Option<RateLimiter>,
    formatter: Option<Box<dyn Formatter>>,
    metrics: Metrics,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

struct Payload {
    body: Vec<u8>,
    content_type: &'static str,
}

impl Sender {
    pub fn new(config: &Config) -> Result<Self, WebhookError> {
        let webhook = &config.notifications.webhook;

        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| WebhookError::Client(e.to_string()))?;

        let breaker = webhook.circuit_breaker.enabled.then(|| {
            CircuitBreaker::new(
                webhook.circuit_breaker.failure_threshold,
                webhook.circuit_breaker.success_threshold,
                webhook.circuit_breaker.timeout(),
            )
        });

        let limiter = webhook
            .rate_limit
            .enabled
            .then(|| RateLimiter::new(webhook.rate_limit.requests_per_minute));

        Ok(Self {
            inner: Arc::new(SenderInner {
                config: config.clone(),
                client,
                retryer: Retryer::new(RetryConfig::from_settings(&webhook.retry)),
                breaker,
                limiter,
                formatter: formatter_for_preset(&webhook.preset, &webhook.chat_id),
                metrics: Metrics::new(),
                tracker: TaskTracker::new(),
                cancel: CancellationToken::new(),
            }),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.webhook().enabled
    }

    /// Current breaker state, or `None` when the breaker is disabled.
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.inner.breaker.as_ref().map(CircuitBreaker::current_state)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Delivers one notification, returning the terminal error if any.
    ///
    /// `RateLimitExceeded` and `CircuitOpen` mean nothing was sent.
    pub async fn send(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
    ) -> Result<(), WebhookError> {
        let inner = &self.inner;
        if !inner.webhook().enabled {
            debug!(target: "webhook", "Webhooks disabled, skipping");
            return Ok(());
        }

        if let Some(limiter) = &inner.limiter {
            if !limiter.allow() {
                inner.metrics.record_rate_limited();
                warn!(target: "webhook", session_id, "Rate limit exceeded, dropping webhook");
                return Err(WebhookError::RateLimitExceeded);
            }
        }

        if let Some(breaker) = &inner.breaker {
            if breaker.current_state() == CircuitState::Open {
                inner.metrics.record_circuit_open();
                inner.metrics.set_circuit_state(CircuitState::Open);
                warn!(target: "webhook", session_id, "Circuit breaker open, skipping webhook");
                return Err(WebhookError::CircuitOpen);
            }
        }

        let request_id = Uuid::new_v4().to_string();
        inner.metrics.record_request();
        let start = Instant::now();

        let result = inner
            .deliver(&request_id, status, message, session_id)
            .await;

        let latency = start.elapsed();
        match &result {
            Ok(()) => {
                inner.metrics.record_success(status, latency);
                info!(target: "webhook", %request_id, ?latency, %status, "Webhook sent");
            }
            Err(e) => {
                inner.metrics.record_failure(latency);
                error!(target: "webhook", %request_id, ?latency, error = %e, "Webhook failed");
            }
        }

        if let Some(breaker) = &inner.breaker {
            inner.metrics.set_circuit_state(breaker.current_state());
        }

        result
    }

    /// Runs [`Sender::send`] as a tracked background task.
    ///
    /// A panic inside the send is caught and surfaces as `TaskPanicked` on the
    /// returned handle; callers may drop the handle and rely on
    /// [`Sender::shutdown`] to drain.
    pub fn send_async(
        &self,
        status: Status,
        message: impl Into<String>,
        session_id: impl Into<String>,
    ) -> JoinHandle<Result<(), WebhookError>> {
        let sender = self.clone();
        let message = message.into();
        let session_id = session_id.into();

        self.spawn_tracked(async move { sender.send(status, &message, &session_id).await })
    }

    /// Spawns `send` on its own task so a panic is caught at the join, then
    /// tracks the join for [`Sender::shutdown`].
    fn spawn_tracked<F>(&self, send: F) -> JoinHandle<Result<(), WebhookError>>
    where
        F: Future<Output = Result<(), WebhookError>> + Send + 'static,
    {
        let task = tokio::spawn(send);

        self.inner.tracker.spawn(async move {
            match task.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    warn!(target: "webhook", error = %e, "Async webhook send failed");
                    Err(e)
                }
                Err(join_err) if join_err.is_panic() => {
                    let message = panic_message(join_err.into_panic());
                    error!(target: "webhook", panic = %message, "Async webhook send panicked");
                    Err(WebhookError::TaskPanicked(message))
                }
                Err(_) => Err(WebhookError::Cancelled),
            }
        })
    }

    /// Waits up to `timeout` for in-flight async sends.
    ///
    /// On timeout the root token is cancelled, aborting outstanding HTTP calls
    /// and retry waits. A request already on the wire may still arrive.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), WebhookError> {
        let inner = &self.inner;
        inner.tracker.close();

        let drained = tokio::time::timeout(timeout, inner.tracker.wait()).await;
        inner.cancel.cancel();

        match drained {
            Ok(()) => {
                debug!(target: "webhook", "All webhook sends completed");
                Ok(())
            }
            Err(_) => {
                warn!(
                    target: "webhook",
                    ?timeout,
                    pending = inner.tracker.len(),
                    "Webhook shutdown timed out"
                );
                Err(WebhookError::ShutdownTimeout(timeout))
            }
        }
    }
}

impl SenderInner {
    fn webhook(&self) -> &WebhookConfig {
        &self.config.notifications.webhook
    }

    async fn deliver(
        &self,
        request_id: &str,
        status: Status,
        message: &str,
        session_id: &str,
    ) -> Result<(), WebhookError> {
        let payload = self.build_payload(status, message, session_id)?;
        let url = validate_url(&self.webhook().url)?;

        let payload = &payload;
        let url = &url;
        let attempt = move || self.post(request_id, url, payload);
        let retryer = &self.retryer;
        let cancel = &self.cancel;

        match &self.breaker {
            Some(breaker) => breaker.execute(move || retryer.run(cancel, attempt)).await,
            None => retryer.run(cancel, attempt).await,
        }
    }

    fn build_payload(
        &self,
        status: Status,
        message: &str,
        session_id: &str,
    ) -> Result<Payload, WebhookError> {
        let info = self.config.status_info(status);

        if let Some(formatter) = &self.formatter {
            let value = formatter.format(status, message, session_id, &info)?;
            return Ok(Payload {
                body: serde_json::to_vec(&value)?,
                content_type: "application/json",
            });
        }

        match self.webhook().format {
            PayloadFormat::Text => Ok(Payload {
                body: format!("[{}] {}", status, message).into_bytes(),
                content_type: "text/plain",
            }),
            PayloadFormat::Json => {
                let value = json!({
                    "status": status,
                    "message": message,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                    "session_id": session_id,
                    "source": "claude-notify",
                    "title": info.title,
                });
                Ok(Payload {
                    body: serde_json::to_vec(&value)?,
                    content_type: "application/json",
                })
            }
        }
    }

    async fn post(
        &self,
        request_id: &str,
        url: &Url,
        payload: &Payload,
    ) -> Result<(), WebhookError> {
        let mut request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, payload.content_type)
            .header("X-Request-ID", request_id)
            .body(payload.body.clone());

        for (name, value) in &self.webhook().headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(WebhookError::Cancelled),
            response = request.send() => response?,
        };

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = read_capped(response, MAX_RESPONSE_BODY).await;
        debug!(
            target: "webhook",
            request_id,
            status = status.as_u16(),
            "Webhook endpoint returned error"
        );
        Err(WebhookError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Accepts only absolute http(s) URLs with a non-empty host.
pub fn validate_url(raw: &str) -> Result<Url, WebhookError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(WebhookError::InvalidUrl("URL is empty".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| WebhookError::InvalidUrl(format!("{raw}: {e}")))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(WebhookError::InvalidUrl(format!(
            "{raw}: URL must use http or https scheme"
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(WebhookError::InvalidUrl(format!("{raw}: URL must have a host")));
    }

    Ok(url)
}

async fn read_capped(mut response: reqwest::Response, limit: usize) -> String {
    let mut buf = Vec::new();
    while let Ok(Some(chunk)) = response.chunk().await {
        let take = chunk.len().min(limit - buf.len());
        buf.extend_from_slice(&chunk[..take]);
        if buf.len() >= limit {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
