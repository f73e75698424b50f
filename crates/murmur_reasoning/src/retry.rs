//! Bounded retries with exponential backoff for completion requests.
//!
//! Transient failures (408, 429, 5xx gateway errors, network errors) are
//! retried. Any other non-success status fails on the first attempt.

use anyhow::Result;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts in total, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(20),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.backoff_factor;
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Server-requested wait, in whole seconds, capped at `max`.
fn retry_after(response: &Response, max: Duration) -> Option<Duration> {
    let secs: u64 = response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()?;
    Some(Duration::from_secs(secs).min(max))
}

/// Run `operation` until it yields a successful response, a non-retryable
/// status, or the attempt budget runs out. Error messages carry
/// `provider_name` and the response body so they can be shown to users.
pub async fn with_retry<F, Fut>(
    config: &RetryConfig,
    provider_name: &str,
    operation: F,
) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Response>>,
{
    let attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut last_error = String::from("no attempt made");

    for attempt in 1..=attempts {
        let mut wait = delay;
        match operation().await {
            Ok(response) if response.status().is_success() => {
                if attempt > 1 {
                    tracing::info!("{} succeeded on attempt {}", provider_name, attempt);
                }
                return Ok(response);
            }
            Ok(response) => {
                let status = response.status();
                if let Some(requested) = retry_after(&response, config.max_delay) {
                    wait = requested;
                }
                let body = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    anyhow::bail!("{} API error ({}): {}", provider_name, status, body);
                }
                tracing::warn!(
                    "{} returned {} on attempt {}/{}: {}",
                    provider_name,
                    status,
                    attempt,
                    attempts,
                    body.chars().take(200).collect::<String>()
                );
                last_error = format!("{} ({}): {}", provider_name, status, body);
            }
            Err(e) => {
                tracing::warn!(
                    "{} request failed on attempt {}/{}: {:#}",
                    provider_name,
                    attempt,
                    attempts,
                    e
                );
                last_error = format!("{}: {:#}", provider_name, e);
            }
        }

        if attempt < attempts {
            tracing::debug!(
                "{} retrying in {:.1}s",
                provider_name,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
            delay = config.next_delay(delay);
        }
    }

    anyhow::bail!("{} gave up after {} attempts: {}", provider_name, attempts, last_error)
}
