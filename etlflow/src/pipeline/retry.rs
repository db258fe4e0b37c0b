//! Retry utilities with configurable backoff and jitter strategies.
//!
//! Fetches and batch inserts share this loop. It never raises on its own: the
//! caller gets a [`RetryOutcome`] holding either the value or the last error,
//! plus how many attempts were made.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::cancellation::CancellationToken;
use crate::errors::EtlError;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Jitter strategy to prevent thundering herd.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Which errors are worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOn {
    /// Only errors classified as transient.
    Transient,
    /// Any failure to get a 2xx answer from the remote side.
    #[default]
    Remote,
    /// Every error.
    Any,
}

impl RetryOn {
    /// Returns true if `err` should be retried under this policy.
    #[must_use]
    pub fn matches(&self, err: &EtlError) -> bool {
        match self {
            Self::Transient => err.is_transient(),
            Self::Remote => matches!(
                err,
                EtlError::Transport(_) | EtlError::RemoteStatus { .. } | EtlError::Io(_)
            ),
            Self::Any => !matches!(err, EtlError::Cancelled(_)),
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the first one.
    pub max_attempts: usize,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
    /// Which errors trigger another attempt.
    pub retry_on: RetryOn,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::None,
            retry_on: RetryOn::Remote,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Exponential backoff starting at `base_delay_ms`.
    #[must_use]
    pub fn exponential(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(base_delay_ms)
    }

    /// Fixed delay between attempts.
    #[must_use]
    pub fn fixed(max_attempts: usize, delay_ms: u64) -> Self {
        Self::new()
            .with_max_attempts(max_attempts)
            .with_base_delay_ms(delay_ms)
            .with_backoff(BackoffStrategy::Constant)
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Sets which errors are retried.
    #[must_use]
    pub fn with_retry_on(mut self, retry_on: RetryOn) -> Self {
        self.retry_on = retry_on;
        self
    }

    /// Delay before retry number `retry` (0 for the wait after the first failure).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => {
                let exp = u32::try_from(retry).unwrap_or(u32::MAX);
                base.saturating_mul(2u64.saturating_pow(exp)).min(max)
            }
            BackoffStrategy::Linear => base.saturating_mul(retry as u64 + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Result of running an operation under a retry policy.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// The value, or the last error seen.
    pub result: Result<T, EtlError>,
    /// Attempts actually made.
    pub attempts: usize,
    /// Set when the loop stopped because the run was cancelled.
    pub interrupted: Option<String>,
}

impl<T> RetryOutcome<T> {
    /// Returns true if the operation eventually succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Executes an operation with retry logic.
///
/// `on_retry` is called with the 1-based attempt that failed, its error and
/// the delay before the next attempt.
pub async fn retry_with<T, F, Fut, R>(
    config: &RetryConfig,
    key: &str,
    token: &CancellationToken,
    mut on_retry: R,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, EtlError>>,
    R: FnMut(usize, &EtlError, Duration),
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        if token.is_cancelled() {
            let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
            return RetryOutcome {
                result: Err(EtlError::Cancelled(reason.clone())),
                attempts,
                interrupted: Some(reason),
            };
        }

        attempts += 1;
        let err = match operation(attempts).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    interrupted: None,
                }
            }
            Err(e) => e,
        };

        if attempts >= max_attempts || !config.retry_on.matches(&err) {
            return RetryOutcome {
                result: Err(err),
                attempts,
                interrupted: None,
            };
        }

        let delay = token.clamp_delay(config.delay_for(attempts - 1));
        tracing::debug!(
            key = %key,
            attempt = attempts,
            max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Retrying after error"
        );
        on_retry(attempts, &err, delay);
        tokio::time::sleep(delay).await;

        if token.is_cancelled() {
            return RetryOutcome {
                result: Err(err),
                attempts,
                interrupted: token.reason(),
            };
        }
    }
}
