//! Bounded fixed-delay retry with cancellation.
//!
//! Used for polling: try an operation up to `attempts` times, sleeping a
//! fixed `delay` between tries. The cancellation token is checked before
//! every attempt and raced against every sleep, so shutdown aborts a long
//! wait promptly instead of running to the ceiling.
//!
//! # Example
//!
//! ```ignore
//! use chaos_operator::retry::{retry_bounded, RetryPolicy};
//!
//! let policy = RetryPolicy::new(180, Duration::from_secs(1));
//! retry_bounded(&policy, &token, "pod termination", || async {
//!     let pods = kube.list_pods(ns, &selector).await.map_err(|e| e.to_string())?;
//!     if pods.is_empty() { Ok(()) } else { Err(format!("{} pods remain", pods.len())) }
//! })
//! .await?;
//! ```

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How many times to try and how long to wait between tries
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (at least one attempt is always made)
    pub attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given ceiling and delay
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(180, Duration::from_secs(1))
    }
}

/// Why a bounded retry gave up
#[derive(Debug, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last error
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error returned by the final attempt
        last: E,
    },
    /// The token was cancelled before the operation succeeded
    Cancelled,
}

/// Run `operation` until it succeeds, the policy is exhausted, or `cancel` fires.
pub async fn retry_bounded<F, Fut, T, E>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            debug!(operation = %operation_name, attempt, "retry cancelled");
            return Err(RetryError::Cancelled);
        }

        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            warn!(
                operation = %operation_name,
                attempt,
                error = %err,
                "operation did not succeed within attempt ceiling"
            );
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        debug!(
            operation = %operation_name,
            attempt,
            error = %err,
            "operation not yet successful, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(operation = %operation_name, attempt, "retry cancelled during delay");
                return Err(RetryError::Cancelled);
            }
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}
