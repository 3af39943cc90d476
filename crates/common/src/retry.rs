//! Retry utilities with exponential backoff and jitter.
//!
//! The flush loop talks to the backing store, and the store can be slow or
//! briefly unavailable. This module provides the pieces the loop needs:
//!
//! - [`RetryPolicy`]: exponential backoff with jitter and an attempt cap
//! - [`retry_async`]: async retry loop with per-attempt timeout and
//!   cancellation
//! - [`watchdog`]: a single attempt under a deadline, for paths that retry
//!   at a higher level (the flush cycle itself)
//! - [`RetryOutcome`]: failure classification that keeps the caller's error
//!   type intact, so nothing is stringly converted on the way up
//!
//! Timeouts are always treated as retryable; cancellation always wins.

use std::borrow::Cow;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// =============================================================================
// Retry Outcome
// =============================================================================

/// Why a retried operation ultimately did not produce a value.
///
/// Generic over `E` so the store's own error type survives the loop.
#[derive(Debug)]
pub enum RetryOutcome<E> {
    /// The cancellation token fired. Takes priority over everything else.
    Cancelled,

    /// The final attempt exceeded its deadline. `action` is the label the
    /// caller passed in, for log correlation.
    Timeout {
        action: Cow<'static, str>,
    },

    /// Every permitted attempt failed with a retryable error.
    Exhausted {
        /// Total attempts made.
        attempts: u32,
        /// Error from the last attempt.
        last_error: E,
    },

    /// The error was classified as not worth retrying.
    Failed(E),
}

impl<E: Display> Display for RetryOutcome<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::Timeout { action } => write!(f, "timeout: {}", action),
            Self::Exhausted {
                attempts,
                last_error,
            } => write!(f, "exhausted after {} attempts: {}", attempts, last_error),
            Self::Failed(e) => write!(f, "non-retryable error: {}", e),
        }
    }
}

impl<E: Display + std::fmt::Debug> std::error::Error for RetryOutcome<E> {}

impl<E> RetryOutcome<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Inner error for `Exhausted`/`Failed`; `None` otherwise.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Exhausted { last_error, .. } => Some(last_error),
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }

    /// Convert the error type when propagating upward.
    pub fn map_err<F, U>(self, f: F) -> RetryOutcome<U>
    where
        F: FnOnce(E) -> U,
    {
        match self {
            Self::Cancelled => RetryOutcome::Cancelled,
            Self::Timeout { action } => RetryOutcome::Timeout { action },
            Self::Exhausted {
                attempts,
                last_error,
            } => RetryOutcome::Exhausted {
                attempts,
                last_error: f(last_error),
            },
            Self::Failed(e) => RetryOutcome::Failed(f(e)),
        }
    }
}

// =============================================================================
// Retry Policy
// =============================================================================

/// Exponential backoff with jitter.
///
/// Each `next_backoff()` returns the current backoff with jitter applied and
/// doubles the internal value, capped at `max`. With `jitter = 0.2` and
/// `initial = 1s` the first delay lands somewhere in [0.8s, 1.2s]; the
/// spread keeps concurrent retriers from hammering the store in lockstep.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Initial backoff interval.
    pub initial: Duration,

    /// Cap on exponential growth.
    pub max: Duration,

    /// Jitter factor in [0.0, 1.0], applied as a ±fraction of the backoff.
    pub jitter: f64,

    /// Maximum attempts. `None` = retry until cancelled.
    pub max_retries: Option<u32>,

    // Internal state, advances with each next_backoff() call.
    current_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            jitter: 0.2,
            max_retries: Some(3),
            current_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(
        initial: Duration,
        max: Duration,
        jitter: f64,
        max_retries: Option<u32>,
    ) -> Self {
        Self {
            initial,
            max,
            jitter: jitter.clamp(0.0, 1.0),
            max_retries,
            current_backoff: initial,
        }
    }

    /// Next delay, with jitter; advances the internal backoff.
    pub fn next_backoff(&mut self) -> Duration {
        let current = self.current_backoff;

        self.current_backoff = current.saturating_mul(2).min(self.max);

        if self.jitter > 0.0 {
            let jitter_range = -self.jitter..self.jitter;
            let jitter_factor = 1.0 + rand::rng().random_range(jitter_range);
            current.mul_f64(jitter_factor).max(Duration::from_nanos(1))
        } else {
            current
        }
    }

    /// Reset the progression after a success.
    pub fn reset(&mut self) {
        self.current_backoff = self.initial;
    }

    /// Whether `attempt` (1-indexed) is still permitted.
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.max_retries.is_none_or(|max| attempt <= max)
    }
}

// =============================================================================
// Retry Function
// =============================================================================

/// Run `op` until it succeeds, is cancelled, exhausts the policy, or hits a
/// non-retryable error.
///
/// `op` receives the 1-indexed attempt number and is invoked fresh per
/// attempt. `is_retryable` classifies errors; timeouts are retryable
/// unconditionally. Each attempt runs under `attempt_timeout`. Cancellation
/// is honored before each attempt and during backoff sleeps, so shutdown is
/// never stuck behind a long delay.
pub async fn retry_async<T, E, Fut, Op, IsRetryable>(
    mut op: Op,
    is_retryable: IsRetryable,
    attempt_timeout: Duration,
    mut policy: RetryPolicy,
    cancel: &CancellationToken,
    label: &'static str,
) -> Result<T, RetryOutcome<E>>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
    Op: FnMut(u32) -> Fut,
    IsRetryable: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut last_error: Option<E> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryOutcome::Cancelled);
        }

        attempt += 1;

        if !policy.should_retry(attempt) {
            return Err(match last_error {
                Some(e) => RetryOutcome::Exhausted {
                    attempts: attempt - 1,
                    last_error: e,
                },
                None => RetryOutcome::Timeout {
                    action: Cow::Borrowed(label),
                },
            });
        }

        debug!(label = label, attempt = attempt, "starting attempt");

        match timeout(attempt_timeout, op(attempt)).await {
            Ok(Ok(value)) => {
                debug!(label = label, attempt = attempt, "operation succeeded");
                return Ok(value);
            }

            Ok(Err(e)) => {
                if is_retryable(&e) {
                    let backoff = policy.next_backoff();
                    warn!(
                        label = label,
                        attempt = attempt,
                        error = %e,
                        backoff_ms = backoff.as_millis(),
                        "retryable error, backing off"
                    );

                    last_error = Some(e);

                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(RetryOutcome::Cancelled);
                        }
                        _ = sleep(backoff) => {}
                    }
                } else {
                    warn!(
                        label = label,
                        attempt = attempt,
                        error = %e,
                        "non-retryable error, giving up"
                    );
                    return Err(RetryOutcome::Failed(e));
                }
            }

            Err(_elapsed) => {
                let backoff = policy.next_backoff();
                warn!(
                    label = label,
                    attempt = attempt,
                    timeout_ms = attempt_timeout.as_millis(),
                    backoff_ms = backoff.as_millis(),
                    "attempt timed out, backing off"
                );

                tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(RetryOutcome::Cancelled);
                    }
                    _ = sleep(backoff) => {}
                }
            }
        }
    }
}

// =============================================================================
// Watchdog (single attempt with deadline)
// =============================================================================

/// Run `op` exactly once under `deadline`, with cancellation.
///
/// For operations whose retry happens at a higher level: the shutdown flush,
/// for instance, gets one bounded attempt and the process exits either way.
pub async fn watchdog<T, E, Fut>(
    op: Fut,
    deadline: Duration,
    cancel: &CancellationToken,
    label: &'static str,
) -> Result<T, RetryOutcome<E>>
where
    E: Display,
    Fut: Future<Output = Result<T, E>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(RetryOutcome::Cancelled),
        result = timeout(deadline, op) => {
            match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(RetryOutcome::Failed(e)),
                Err(_) => Err(RetryOutcome::Timeout {
                    action: Cow::Borrowed(label),
                }),
            }
        }
    }
}

// =============================================================================
// Retryability Helpers
// =============================================================================

/// Implemented by error types that know which of their variants are
/// transient. Pass `E::is_retryable` straight to [`retry_async`].
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Classify an opaque error message as a transient storage condition.
///
/// Fallback for error types that only expose a message. Matches the
/// phrasings SQLite and connection-level failures actually produce.
///
/// # Example
///
/// ```
/// use common::retry::is_retryable_message;
///
/// assert!(is_retryable_message("database is locked"));
/// assert!(is_retryable_message("operation timed out"));
/// assert!(!is_retryable_message("UNIQUE constraint failed"));
/// ```
pub fn is_retryable_message(msg: &str) -> bool {
    let lower = msg.to_lowercase();
    lower.contains("database is locked")
        || lower.contains("database table is locked")
        || lower.contains("busy")
        || lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection reset")
        || lower.contains("connection refused")
        || lower.contains("temporarily unavailable")
        || lower.contains("try again")
}

// =============================================================================
// Tests
// =============================================================================
