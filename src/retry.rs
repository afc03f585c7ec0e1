//! Retry logic with linear or exponential backoff
//!
//! [`with_retry`] wraps any fallible async operation. Transient failures
//! (connection reset, timeout) are retried after a delay that grows with the
//! attempt number `n` (0-based):
//!
//! - linear: `2n + base` seconds
//! - exponential: `2^n + base` seconds
//!
//! After `max_retries` consecutive transient failures the operation fails with
//! [`Error::RetriesExhausted`]. Anything that is not transient, a permanent
//! miss included, is returned at once without consuming the budget.
//!
//! # Example
//!
//! ```no_run
//! use starstream::config::{Backoff, RetryConfig};
//! use starstream::retry::with_retry;
//! use std::time::Duration;
//!
//! # async fn example() -> starstream::Result<()> {
//! let config = RetryConfig {
//!     base_cooldown: Duration::from_secs(5),
//!     max_retries: 3,
//!     backoff: Backoff::Exponential,
//!     jitter: false,
//! };
//! let body = with_retry(&config, || async {
//!     // Your network operation here
//!     Ok::<_, starstream::Error>(b"payload".to_vec())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{Backoff, RetryConfig};
use crate::error::{Error, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (network timeouts, connection reset) should return `true`.
/// Permanent failures (missing remote data, corrupt payloads, local disk errors) should return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            // Only connection-level client failures are worth another attempt
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            Error::PermanentMiss { .. } => false,
            Error::RetriesExhausted { .. } => false,
            Error::Decode(_) => false,
            Error::InvalidRange { .. } | Error::InvalidStep(_) | Error::Config { .. } => false,
            Error::Serialization(_) | Error::Pattern(_) | Error::Other(_) => false,
        }
    }
}

/// Delay before the retry that follows failed attempt `attempt` (0-based)
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let growth = match config.backoff {
        Backoff::Linear => 2u64.saturating_mul(u64::from(attempt)),
        Backoff::Exponential => 2u64.saturating_pow(attempt),
    };
    config
        .base_cooldown
        .saturating_add(Duration::from_secs(growth))
}

/// Execute an async operation, retrying transient failures with backoff
///
/// # Arguments
///
/// * `config` - Retry policy (base cooldown, budget, curve, jitter)
/// * `operation` - Async closure producing a fresh attempt on every call
///
/// # Returns
///
/// The first successful result, the first non-retryable error unchanged, or
/// [`Error::RetriesExhausted`] once `max_retries` transient failures in a row
/// have been seen.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_retries = config.max_retries.max(1);
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                let failures = attempt + 1;
                if failures >= max_retries {
                    tracing::error!(
                        error = %e,
                        attempts = failures,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(Error::RetriesExhausted {
                        attempts: failures,
                        last_error: e.to_string(),
                    });
                }

                let delay = backoff_delay(config, attempt);
                let delay = if config.jitter {
                    add_jitter(delay)
                } else {
                    delay
                };

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_secs = delay.as_secs_f64(),
                    "Connection error, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::debug!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

/// Add up to one second of random jitter to a delay
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_ms: u64 = rng.gen_range(0..=1000);
    delay.saturating_add(Duration::from_millis(jitter_ms))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn policy(backoff: Backoff, base_secs: u64, max_retries: u32) -> RetryConfig {
        RetryConfig {
            base_cooldown: Duration::from_secs(base_secs),
            max_retries,
            backoff,
            jitter: false,
        }
    }

    #[test]
    fn linear_delays_grow_by_two_seconds() {
        let config = policy(Backoff::Linear, 5, 5);
        let delays: Vec<u64> = (0..4).map(|n| backoff_delay(&config, n).as_secs()).collect();
        assert_eq!(delays, vec![5, 7, 9, 11]);
    }

    #[test]
    fn exponential_delays_double_on_top_of_base() {
        let config = policy(Backoff::Exponential, 5, 5);
        let delays: Vec<u64> = (0..5).map(|n| backoff_delay(&config, n).as_secs()).collect();
        assert_eq!(delays, vec![6, 7, 9, 13, 21]);
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let config = policy(Backoff::Exponential, 5, u32::MAX);
        assert!(backoff_delay(&config, 200) >= Duration::from_secs(u64::MAX / 2));
    }

    #[test]
    fn jitter_on_a_saturated_delay_stays_saturated() {
        assert_eq!(add_jitter(Duration::MAX), Duration::MAX);
        let config = policy(Backoff::Exponential, 5, u32::MAX);
        assert_eq!(add_jitter(backoff_delay(&config, 200)), Duration::MAX);
    }

    #[test]
    fn jitter_adds_at_most_one_second() {
        for _ in 0..50 {
            let jittered = add_jitter(Duration::from_secs(5));
            assert!(jittered >= Duration::from_secs(5));
            assert!(jittered <= Duration::from_secs(6));
        }
    }

    #[test]
    fn permanent_miss_is_not_retryable() {
        assert!(!Error::miss("https://example.com", "HTTP 404").is_retryable());
        assert!(!Error::Decode("bad header".into()).is_retryable());
        assert!(Error::Transient("connection reset by peer".into()).is_retryable());
    }

    #[tokio::test]
    async fn success_needs_a_single_attempt() {
        let config = RetryConfig::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "one attempt is enough");
    }

    #[tokio::test(start_paused = true)]
    async fn three_transient_failures_then_success_waits_5_7_9() {
        let config = policy(Backoff::Linear, 5, 5);
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let result = with_retry(&config, || {
            let calls = calls_clone.clone();
            async move {
                let count = {
                    let mut calls = calls.lock().unwrap();
                    calls.push(Instant::now());
                    calls.len()
                };
                if count <= 3 {
                    Err(Error::Transient("connection reset".into()))
                } else {
                    Ok("payload")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "payload");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![5, 7, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn exponential_gaps_follow_powers_of_two() {
        let config = policy(Backoff::Exponential, 1, 4);
        let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let result = with_retry(&config, || {
            let calls = calls_clone.clone();
            async move {
                calls.lock().unwrap().push(Instant::now());
                Err::<(), _>(Error::Transient("timeout".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::RetriesExhausted { attempts: 4, .. })));
        let calls = calls.lock().unwrap();
        let gaps: Vec<u64> = calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect();
        assert_eq!(gaps, vec![2, 3, 5], "2^0+1, 2^1+1, 2^2+1 and no sleep after the last failure");
    }

    #[tokio::test(start_paused = true)]
    async fn budget_counts_total_attempts() {
        let config = policy(Backoff::Linear, 5, 3);
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Transient("connection reset".into()))
            }
        })
        .await;

        match result {
            Err(Error::RetriesExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(last_error.contains("connection reset"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3, "budget is 3 attempts in total");
    }

    #[tokio::test]
    async fn permanent_miss_returns_immediately() {
        let config = RetryConfig::default();
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&config, || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::miss("https://example.com/missing.cdf", "HTTP 404"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::PermanentMiss { .. })));
        assert_eq!(
            counter.load(Ordering::SeqCst),
            1,
            "a miss must not consume the retry budget"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn retry_wait_with_jitter_adds_at_most_one_second() {
        let config = RetryConfig {
            jitter: true,
            ..policy(Backoff::Linear, 5, 2)
        };
        let start = Instant::now();

        let _ = with_retry(&config, || async {
            Err::<(), _>(Error::Transient("timeout".into()))
        })
        .await;

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5), "waited {elapsed:?}");
        assert!(elapsed <= Duration::from_secs(6), "waited {elapsed:?}");
    }
}
