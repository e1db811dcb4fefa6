// SPDX-License-Identifier: MIT
use std::fmt::{Debug, Display};
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Retry and timeout policy attached to one activity invocation.
#[derive(Debug, Clone, Copy)]
pub struct ActivityOptions {
    /// Per-attempt timeout
    pub start_to_close: Duration,
    /// Total attempts before the activity is reported failed
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly with the attempt number
    pub backoff: Duration,
}

impl ActivityOptions {
    pub fn new(start_to_close: Duration, max_attempts: u32) -> Self {
        Self {
            start_to_close,
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(500),
        }
    }
}

/// Terminal failure of an activity after its retry policy is spent.
#[derive(Debug, Error)]
pub enum ActivityFailure<E: Display + Debug> {
    #[error("activity timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("activity failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("{0}")]
    NonRetryable(E),
}

/// Run a side-effectful function as a journalled activity: each attempt is
/// bounded by `start_to_close`, failures the `retryable` predicate accepts
/// are retried with linear backoff up to `max_attempts`, everything else
/// fails immediately.
///
/// Re-execution on retry is visible to the outside world; activities are
/// expected to tolerate it (the engine does not assume side-effect
/// deduplication).
pub async fn execute_activity<T, E, F, Fut>(
    opts: &ActivityOptions,
    retryable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, ActivityFailure<E>>
where
    E: Display + Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match tokio::time::timeout(opts.start_to_close, f()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if !retryable(&e) => return Err(ActivityFailure::NonRetryable(e)),
            Ok(Err(e)) => {
                if attempt >= opts.max_attempts {
                    return Err(ActivityFailure::Exhausted { attempts: attempt, last: e });
                }
                warn!(attempt, error = %e, "activity attempt failed; retrying");
            }
            Err(_) => {
                if attempt >= opts.max_attempts {
                    return Err(ActivityFailure::Timeout { attempts: attempt });
                }
                warn!(attempt, "activity attempt timed out; retrying");
            }
        }
        tokio::time::sleep(opts.backoff * attempt).await;
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn opts(attempts: u32) -> ActivityOptions {
        ActivityOptions::new(Duration::from_secs(1), attempts)
    }

    #[tokio::test]
    async fn first_attempt_success_returns_value() {
        let out: Result<i32, ActivityFailure<String>> =
            execute_activity(&opts(3), |_| true, || async { Ok(42) }).await;
        assert_eq!(out.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_errors_are_retried_until_success() {
        let tries = AtomicU32::new(0);
        let out: Result<&str, ActivityFailure<String>> =
            execute_activity(&opts(3), |_| true, || async {
                if tries.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok("ok")
                }
            })
            .await;
        assert_eq!(out.unwrap(), "ok");
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_after_max_attempts() {
        let tries = AtomicU32::new(0);
        let out: Result<(), ActivityFailure<String>> =
            execute_activity(&opts(3), |_| true, || async {
                tries.fetch_add(1, Ordering::SeqCst);
                Err("always".to_string())
            })
            .await;
        match out {
            Err(ActivityFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "always");
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(tries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_on_first_attempt() {
        let tries = AtomicU32::new(0);
        let out: Result<(), ActivityFailure<String>> =
            execute_activity(&opts(5), |_| false, || async {
                tries.fetch_add(1, Ordering::SeqCst);
                Err("fatal".to_string())
            })
            .await;
        assert!(matches!(out, Err(ActivityFailure::NonRetryable(e)) if e == "fatal"));
        assert_eq!(tries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_an_attempt() {
        let out: Result<(), ActivityFailure<String>> =
            execute_activity(&opts(2), |_| true, || async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(out, Err(ActivityFailure::Timeout { attempts: 2 })));
    }

    #[tokio::test]
    async fn max_attempts_is_clamped_to_at_least_one() {
        let o = ActivityOptions::new(Duration::from_secs(1), 0);
        assert_eq!(o.max_attempts, 1);
    }
}
