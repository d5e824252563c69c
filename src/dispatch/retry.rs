//! Exponential backoff for outbound webhook delivery.
//!
//! - Default: 3 retries with 1s, 2s, 4s delays
//!
//! Only transient failures (network errors, 429, 5xx) are retried. A
//! permanent rejection (other 4xx) is returned immediately.

use std::future::Future;
use std::time::Duration;

/// Whether a failed attempt is worth repeating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transient,
    Permanent,
}

/// Implemented by errors that can be classified for retry.
pub trait Retryable {
    fn failure_kind(&self) -> FailureKind;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(1),
        max_delay: Duration::from_secs(30),
        backoff_multiplier: 2.0,
    };

    /// A single attempt.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
        backoff_multiplier: 1.0,
    };

    pub fn new(
        max_retries: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// `initial_delay * backoff_multiplier^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.backoff_multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|attempt| self.delay_for_attempt(attempt))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    ExhaustedRetries { last_error: E, attempts: u32 },
    PermanentError(E),
}

impl<T, E> RetryResult<T, E> {
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::ExhaustedRetries { last_error, .. } => Err(last_error),
            RetryResult::PermanentError(e) => Err(e),
        }
    }
}

/// Runs `operation` until it succeeds, fails permanently, or retries run out.
pub async fn retry_with_backoff<T, E, F, Fut>(config: RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_retries + 1;
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) => {
                attempt += 1;
                if e.failure_kind() == FailureKind::Permanent {
                    return RetryResult::PermanentError(e);
                }
                if attempt >= max_attempts {
                    return RetryResult::ExhaustedRetries {
                        last_error: e,
                        attempts: attempt,
                    };
                }
                tokio::time::sleep(config.delay_for_attempt(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError(FailureKind);

    impl Retryable for TestError {
        fn failure_kind(&self) -> FailureKind {
            self.0
        }
    }

    // ─── Unit Tests ───────────────────────────────────────────────────────────

    #[test]
    fn default_delays_are_1_2_4() {
        let delays: Vec<_> = RetryConfig::DEFAULT.delays().collect();
        assert_eq!(
            delays,
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[tokio::test]
    async fn permanent_error_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result = retry_with_backoff(RetryConfig::DEFAULT, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError(FailureKind::Permanent)) }
        })
        .await;

        assert!(matches!(result, RetryResult::PermanentError(_)));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_succeeds_on_third_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result = retry_with_backoff(RetryConfig::DEFAULT, move || {
            let n = c.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(TestError(FailureKind::Transient))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success(2)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_exhausts_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let config = RetryConfig::new(2, Duration::from_millis(1), Duration::from_millis(10), 2.0);
        let result = retry_with_backoff(config, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError(FailureKind::Transient)) }
        })
        .await;

        match result {
            RetryResult::ExhaustedRetries { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn none_config_makes_one_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let _ = retry_with_backoff(RetryConfig::NONE, move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError(FailureKind::Transient)) }
        })
        .await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    // ─── Property Tests ───────────────────────────────────────────────────────

    proptest! {
        #[test]
        fn delays_never_exceed_cap(
            initial_ms in 1u64..5000,
            cap_ms in 1u64..60000,
            attempt in 0u32..20,
        ) {
            let config = RetryConfig::new(
                10,
                Duration::from_millis(initial_ms),
                Duration::from_millis(cap_ms),
                2.0,
            );
            prop_assert!(config.delay_for_attempt(attempt) <= Duration::from_millis(cap_ms));
        }

        #[test]
        fn delays_are_monotonic(attempt in 0u32..15) {
            let config = RetryConfig::DEFAULT;
            prop_assert!(config.delay_for_attempt(attempt) <= config.delay_for_attempt(attempt + 1));
        }
    }
}
