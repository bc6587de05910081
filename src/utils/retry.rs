use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// Used in two places:
// - the effect dispatcher, for notification and payment collaborators
// - administrative releases, which refetch and retry on a stale version
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Customer and staff notifications: cheap to resend, give up quickly.
    pub fn notifications() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Settlement checks and refund requests carry money, so try harder.
    pub fn payments() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    /// Admin overrides race against staff activity on the same order.
    pub fn admin_override() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(250),
            multiplier: 2.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let next = Duration::from_millis((delay.as_millis() as f64 * self.multiplier) as u64);
        next.min(self.max_delay)
    }
}

/// Retry policy as it appears in configuration files.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_delay_ms: config.initial_delay.as_millis() as u64,
            max_delay_ms: config.max_delay.as_millis() as u64,
            multiplier: config.multiplier,
        }
    }
}

impl From<&RetryPolicy> for RetryConfig {
    fn from(policy: &RetryPolicy) -> Self {
        Self {
            max_attempts: policy.max_attempts.max(1),
            initial_delay: Duration::from_millis(policy.initial_delay_ms),
            max_delay: Duration::from_millis(policy.max_delay_ms),
            multiplier: policy.multiplier,
        }
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Every attempt failed; holds the last error
    Failed(E),
    /// The error was classified as permanent and not retried
    PermanentFailure(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => Err(error),
        }
    }
}

/// Whether an error is worth another attempt.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

/// Retry every failure until the attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(config: RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    run(config, operation, |_| true).await
}

/// Retry only failures classified as transient.
pub async fn retry_on_transient<F, Fut, T, E>(config: RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    run(config, operation, |error: &E| error.is_transient()).await
}

async fn run<F, Fut, T, E, C>(config: RetryConfig, mut operation: F, retryable: C) -> RetryResult<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt = attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) => error,
        };

        if !retryable(&error) {
            tracing::debug!(error = %error, "Permanent failure, not retrying");
            return RetryResult::PermanentFailure(error);
        }

        if attempt >= config.max_attempts {
            tracing::error!(
                attempt = attempt,
                error = %error,
                "Operation failed after all retries"
            );
            return RetryResult::Failed(error);
        }

        tracing::warn!(
            attempt = attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Operation failed, retrying after delay"
        );

        sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
