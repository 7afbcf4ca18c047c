//! Retry strategy: exponential backoff with a cap, gated by the classifier.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::classify::{classify, is_retryable};

/// Exponential-backoff configuration. Defaults: 3 retries, 1s initial delay,
/// 30s cap, factor 2.0.
#[derive(Clone, Copy, Debug)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the attempt numbered `attempt` (0-indexed, counting the retry, not
    /// the initial try): `min(initial_delay * backoff_factor^attempt, max_delay)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Why a retry loop ended; used for structured logging of retry outcomes.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    Succeeded,
    ExhaustedRetries,
    NonRetryable,
    Cancelled,
}

/// Error surfaced by [`retry`]/[`retry_with_result`] when every attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Inner(E),
}

/// Retries a fallible operation with classified exponential backoff. `fn_` is
/// invoked with the attempt index (0-based); its error is converted to text
/// for classification via `Display`.
pub async fn retry<F, Fut, T, E>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    mut fn_: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_with_result(cancel, config, &mut fn_).await
}

/// Generic retry core; `retry` forwards to this with a `FnMut` closure reference so
/// both a named function and a closure can be passed uniformly.
pub async fn retry_with_result<F, Fut, T, E>(
    cancel: &CancellationToken,
    config: &RetryConfig,
    fn_: &mut F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        match fn_(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                let reason = classify(&e.to_string());
                if !is_retryable(reason) || attempt == config.max_retries {
                    return Err(RetryError::Inner(e));
                }
                let delay = config.delay_for(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                }
                attempt += 1;
            }
        }
    }
}
