//! Retry with exponential backoff for report store writes.
//!
//! Store writes against the remote report are idempotent upserts, so a
//! transient failure can simply be replayed. The policy is:
//! - Exponential backoff (delay doubles each attempt), capped
//! - Optional jitter so many nodes do not hammer a recovering store at once
//! - A caller-supplied predicate decides which errors are worth retrying

use crate::config::ReportDefaults;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (typically 2.0 for doubling).
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: ReportDefaults::RETRY_ATTEMPTS,
            base_delay: ReportDefaults::RETRY_BASE_DELAY,
            max_delay: ReportDefaults::RETRY_MAX_DELAY,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retrying after the given (0-indexed) attempt.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let multiplier = self.exponential_base.powi(attempt as i32);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Factor in [0.5, 1.5): same mean, never near zero.
            let jitter_factor = rand::rng().random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Statistics about a retried operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    pub attempts: u32,
    pub total_delay: Duration,
    pub success: bool,
    pub last_error: Option<String>,
}

/// Retry an async operation with exponential backoff.
///
/// Runs at least once even if `max_attempts` is zero. Returns the final
/// result together with the attempt statistics.
pub async fn retry_async<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (Result<T, E>, RetryStats)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut stats = RetryStats::default();
    let mut attempt = 0;

    loop {
        stats.attempts = attempt + 1;

        let err = match operation().await {
            Ok(value) => {
                stats.success = true;
                if attempt > 0 {
                    debug!("Report write succeeded after {} attempts", attempt + 1);
                }
                return (Ok(value), stats);
            }
            Err(e) => e,
        };
        stats.last_error = Some(err.to_string());

        if !should_retry(&err) {
            debug!("Report error is not retryable: {}", err);
            return (Err(err), stats);
        }
        if attempt + 1 >= max_attempts {
            warn!(
                "All {} report attempts exhausted. Last error: {}",
                max_attempts, err
            );
            return (Err(err), stats);
        }

        let delay = config.calculate_delay(attempt);
        stats.total_delay += delay;
        warn!(
            "Report attempt {}/{} failed: {}. Retrying in {:?}",
            attempt + 1,
            max_attempts,
            err,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetasyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn network(msg: &str) -> MetasyncError {
        MetasyncError::Network {
            message: msg.to_string(),
            cause: None,
        }
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_millis(200))
            .with_max_delay(Duration::from_secs(1))
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_millis(200));
        assert_eq!(config.calculate_delay(1), Duration::from_millis(400));
        assert_eq!(config.calculate_delay(2), Duration::from_millis(800));
        assert_eq!(config.calculate_delay(3), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(60))
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(
                delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3),
                "Delay {:?} should be between 1s and 3s",
                delay
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_store_failure_recovers() {
        let config = RetryConfig::new().with_max_attempts(3).with_jitter(false);
        let calls = Arc::new(AtomicU32::new(0));

        let (result, stats) = retry_async(
            &config,
            || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(network("connection reset"))
                    } else {
                        Ok("stored")
                    }
                }
            },
            MetasyncError::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), "stored");
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_keeps_last_error() {
        let config = RetryConfig::new().with_max_attempts(2).with_jitter(false);

        let (result, stats) = retry_async(
            &config,
            || async { Err::<(), _>(network("store unreachable")) },
            MetasyncError::is_retryable,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(stats.attempts, 2);
        assert!(!stats.success);
        assert_eq!(
            stats.last_error.as_deref(),
            Some("Network error: store unreachable")
        );
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let config = RetryConfig::new().with_max_attempts(5);
        let calls = AtomicU32::new(0);

        let (result, stats) = retry_async(
            &config,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(MetasyncError::not_found("k")) }
            },
            MetasyncError::is_retryable,
        )
        .await;

        assert!(result.unwrap_err().is_not_found());
        assert_eq!(stats.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let config = RetryConfig::none().with_max_attempts(0);
        let (result, stats) =
            retry_async(&config, || async { Ok::<_, MetasyncError>(7) }, |_: &MetasyncError| true)
                .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(stats.attempts, 1);
    }
}
