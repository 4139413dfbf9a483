//! Shared throttle cooldown and retry with exponential backoff
//!
//! Every remote call made by the engine goes through [`with_retry`]:
//!
//! 1. Wait until the shared [`ThrottleGate`] cooldown has passed
//! 2. Issue the call
//! 3. On a retryable failure, back off `base * 2^attempt` and try again, up
//!    to `max_attempts` calls in total
//!
//! A throttling response additionally pushes the gate's deadline out to
//! `max(retry_after, backoff)`, so every worker pauses instead of only the
//! one that was throttled. The deadline is the only state shared between
//! workers and sits behind a mutex that is never held across an await.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use spsync_core::config::SyncConfig;
use spsync_core::ports::RemoteError;
use spsync_core::stats::SyncStats;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Upper bound for a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// Upper bound for a server-provided retry-after
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// How often and how patiently a unit of work is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of calls, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Delay after the failed attempt number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Pool-wide cooldown deadline set by throttling responses
#[derive(Debug, Default)]
pub struct ThrottleGate {
    cooldown_until: Mutex<Option<Instant>>,
}

impl ThrottleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the deadline to at least `now + delay`
    ///
    /// A deadline already further out is kept.
    pub fn extend(&self, delay: Duration) {
        let candidate = Instant::now() + delay.min(MAX_RETRY_AFTER);
        if let Ok(mut deadline) = self.cooldown_until.lock() {
            match *deadline {
                Some(existing) if existing >= candidate => {}
                _ => *deadline = Some(candidate),
            }
        }
    }

    /// Time left until the deadline, `None` if there is no active cooldown
    pub fn remaining(&self) -> Option<Duration> {
        let deadline = (*self.cooldown_until.lock().ok()?)?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    /// Sleeps until the cooldown has passed
    ///
    /// Re-checks after waking, since another worker may have extended the
    /// deadline in the meantime.
    ///
    /// # Errors
    /// Returns `Cancelled` if `cancel` fires while waiting
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        while let Some(remaining) = self.remaining() {
            debug!(wait_ms = remaining.as_millis() as u64, "Waiting for throttle cooldown");
            sleep_or_cancel(remaining, cancel).await?;
        }
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}

/// The run was cancelled while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// Sleeps for `delay` unless `cancel` fires first
pub async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Why [`with_retry`] gave up
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// Retryable failures persisted for every attempt
    #[error("{attempts} attempts failed, last error: {last}")]
    Exhausted { attempts: u32, last: RemoteError },

    /// A failure that retrying cannot fix
    #[error("{0}")]
    Fatal(RemoteError),

    #[error("cancelled")]
    Cancelled,
}

impl From<Cancelled> for RetryError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Runs `operation` under the retry policy and the shared throttle gate
///
/// # Errors
/// See [`RetryError`]
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    gate: &ThrottleGate,
    stats: &SyncStats,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 0u32;
    loop {
        gate.wait(cancel).await?;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation = operation_name, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(RetryError::Fatal(err));
        }
        if err.is_throttle() {
            stats.record_throttle();
        }

        attempt += 1;
        if attempt >= policy.max_attempts {
            warn!(operation = operation_name, attempts = attempt, error = %err, "Giving up after retries");
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let backoff = policy.backoff(attempt - 1);
        stats.record_retry();
        if err.is_throttle() {
            let delay = err.retry_after().map_or(backoff, |hint| hint.max(backoff));
            warn!(
                operation = operation_name,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Throttled, pausing all workers"
            );
            gate.extend(delay);
        } else {
            warn!(
                operation = operation_name,
                attempt,
                delay_ms = backoff.as_millis() as u64,
                error = %err,
                "Transient error, retrying"
            );
            sleep_or_cancel(backoff, cancel).await?;
        }
    }
}

/// Retry policy, throttle gate, statistics and cancellation bundled for
/// the workers of one run
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
    gate: Arc<ThrottleGate>,
    stats: Arc<SyncStats>,
    cancel: CancellationToken,
}

impl Retrier {
    pub fn new(
        policy: RetryPolicy,
        gate: Arc<ThrottleGate>,
        stats: Arc<SyncStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            policy,
            gate,
            stats,
            cancel,
        }
    }

    /// Same retrier, cancelled by `cancel` instead
    #[must_use]
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    /// Runs `operation` through [`with_retry`]
    pub async fn run<T, F, Fut>(&self, operation_name: &str, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        with_retry(
            operation_name,
            &self.policy,
            &self.gate,
            &self.stats,
            &self.cancel,
            operation,
        )
        .await
    }

    pub fn stats(&self) -> &Arc<SyncStats> {
        &self.stats
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
