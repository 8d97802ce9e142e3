//! Bounded, cancellable retry with a fixed period.
//!
//! Used to re-evaluate a convergence check until it passes, fails
//! permanently, or the attempt budget runs out. The action only observes
//! remote state, so nothing is compensated on failure.
//!
//! # Example
//!
//! ```ignore
//! use rollout_rig::retry::{retry, RetrySettings};
//!
//! let settings = RetrySettings::resolve(0, Duration::ZERO); // defaults
//! retry(&cancel, "status", settings, || async { check().await }).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Error, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_PERIOD};

/// Attempt budget and period for a retried check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrySettings {
    /// Maximum number of attempts (always at least 1)
    pub attempts: u32,
    /// Pause between attempts
    pub period: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            period: DEFAULT_RETRY_PERIOD,
        }
    }
}

impl RetrySettings {
    /// Build settings from caller values, substituting defaults for zeros.
    ///
    /// Zero and "unspecified" are the same thing to callers.
    pub fn resolve(attempts: u32, period: Duration) -> Self {
        let defaults = Self::default();
        Self {
            attempts: if attempts == 0 {
                defaults.attempts
            } else {
                attempts
            },
            period: if period.is_zero() {
                defaults.period
            } else {
                period
            },
        }
    }
}

/// Run `action` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors for which [`Error::is_retryable`] holds lead to another
/// attempt; the last retryable error is returned once the budget is spent.
/// Cancellation is checked before every attempt after the first and during
/// the pause between attempts; it yields [`Error::Cancelled`].
pub async fn retry<F, Fut, T>(
    cancel: &CancellationToken,
    operation_name: &str,
    settings: RetrySettings,
    mut action: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = settings.attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        if attempt > 1 && cancel.is_cancelled() {
            return Err(Error::cancelled(operation_name));
        }

        match action().await {
            Ok(result) => {
                debug!(operation = %operation_name, attempt, "check passed");
                return Ok(result);
            }
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= attempts {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %e,
                        "giving up after max attempts"
                    );
                    return Err(e);
                }

                debug!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    period_ms = settings.period.as_millis(),
                    "not ready, retrying"
                );

                tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::cancelled(operation_name)),
                    _ = tokio::time::sleep(settings.period) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn settings(attempts: u32) -> RetrySettings {
        RetrySettings {
            attempts,
            period: Duration::from_millis(10),
        }
    }

    fn not_ready(n: u32) -> Error {
        Error::mismatch("Deployment default/web", format!("attempt {n}"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_immediately() {
        let cancel = CancellationToken::new();
        let result = retry(&cancel, "op", settings(3), || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result = retry(&cancel, "op", settings(3), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 {
                    Err(not_ready(n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts_and_returns_last_error() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = retry(&cancel, "op", settings(3), || {
            let c = c.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                Err(not_ready(n))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("attempt 3"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_stops_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();

        let result: Result<(), Error> = retry(&cancel, "op", settings(5), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::not_found("Deployment", "default", "web"))
            }
        })
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    /// Cancelling during the first failed attempt must stop the loop before
    /// the action runs again.
    #[tokio::test(start_paused = true)]
    async fn test_cancellation_prevents_next_attempt() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let result: Result<(), Error> = retry(&cancel, "status", settings(5), || {
            let c = c.clone();
            let token = token.clone();
            async move {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                token.cancel();
                Err(not_ready(n))
            }
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_sleep() {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            token.cancel();
        });

        let long = RetrySettings {
            attempts: 10,
            period: Duration::from_secs(3600),
        };
        let started = tokio::time::Instant::now();
        let result: Result<(), Error> =
            retry(&cancel, "status", long, || async { Err(not_ready(0)) }).await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_values_resolve_to_defaults() {
        assert_eq!(RetrySettings::resolve(0, Duration::ZERO), RetrySettings::default());
        assert_eq!(
            RetrySettings::resolve(5, Duration::ZERO),
            RetrySettings {
                attempts: 5,
                period: DEFAULT_RETRY_PERIOD
            }
        );
        assert_eq!(
            RetrySettings::resolve(0, Duration::from_millis(250)).attempts,
            DEFAULT_RETRY_ATTEMPTS
        );
    }
}
