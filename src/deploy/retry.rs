//! Bounded retry with configurable backoff
//!
//! One policy object (attempts, backoff schedule, retryable-error predicate)
//! shared by every rate-limit-sensitive provider call in a deployment.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Errors that know whether another attempt could succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry configuration with backoff strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Maximum attempts, the first call included
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Backoff strategy
    #[serde(default)]
    pub backoff: BackoffStrategy,

    /// Delay before the first retry
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound on any single delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Add jitter to delays
    #[serde(default)]
    pub jitter: bool,

    /// Jitter factor (0.0 to 1.0)
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: BackoffStrategy::default(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            jitter: false,
            jitter_factor: default_jitter_factor(),
        }
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Linear increase in delay
    Linear {
        #[serde(with = "humantime_serde")]
        increment: Duration,
    },
    /// Exponential increase in delay
    Exponential {
        #[serde(default = "default_exponential_base")]
        base: f64,
    },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        BackoffStrategy::Linear {
            increment: Duration::from_millis(500),
        }
    }
}

/// Retry executor shared across a deployment
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<RwLock<RetryMetrics>>,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(RwLock::new(RetryMetrics::default())),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation, retrying while its error reports itself retryable
    pub async fn execute_with_retry<F, Fut, T, E>(&self, operation: F, context: &str) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        self.execute_with_predicate(operation, context, |err: &E| err.is_retryable())
            .await
    }

    /// Execute an operation, retrying while `should_retry` accepts the error
    ///
    /// The error returned after the last attempt is the operation's own
    /// error, never a wrapper.
    pub async fn execute_with_predicate<F, Fut, T, E, P>(
        &self,
        operation: F,
        context: &str,
        should_retry: P,
    ) -> Result<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation().await {
                Ok(result) => {
                    self.metrics.write().await.record_success(attempt);
                    return Ok(result);
                }
                Err(err) => {
                    if !should_retry(&err) {
                        debug!("{} failed with a non-retryable error: {}", context, err);
                        self.metrics.write().await.record_failure(attempt);
                        return Err(err);
                    }

                    if attempt >= self.config.attempts {
                        info!(
                            "{} still failing after {} attempts: {}",
                            context, attempt, err
                        );
                        self.metrics.write().await.record_failure(attempt);
                        return Err(err);
                    }

                    let delay = self.apply_jitter(self.calculate_delay(attempt));

                    info!(
                        "Retrying {} (attempt {}/{}) after {:?}: {}",
                        context, attempt, self.config.attempts, delay, err
                    );

                    tokio::time::sleep(delay).await;
                    self.metrics.write().await.record_retry(attempt, delay);
                }
            }
        }
    }

    /// Calculate the delay that follows the given failed attempt
    ///
    /// The result never exceeds `max_delay`, whatever the backoff parameters.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let steps = attempt.saturating_sub(1);
        let max_delay = self.config.max_delay;
        let base_delay = match &self.config.backoff {
            BackoffStrategy::Fixed => self.config.initial_delay,
            BackoffStrategy::Linear { increment } => self
                .config
                .initial_delay
                .saturating_add(increment.saturating_mul(steps)),
            BackoffStrategy::Exponential { base } => {
                let exponent = i32::try_from(steps).unwrap_or(i32::MAX);
                let secs = self.config.initial_delay.as_secs_f64() * base.powi(exponent);
                // Clamp in f64 first; the conversion panics on overflow or NaN
                if secs.is_finite() && secs < max_delay.as_secs_f64() {
                    Duration::from_secs_f64(secs.max(0.0))
                } else {
                    max_delay
                }
            }
        };

        base_delay.min(max_delay)
    }

    /// Apply jitter to delay
    ///
    /// The factor is clamped to 0.0..=1.0.
    pub fn apply_jitter(&self, delay: Duration) -> Duration {
        if !self.config.jitter {
            return delay;
        }

        let factor = if self.config.jitter_factor.is_finite() {
            self.config.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if factor == 0.0 || delay.is_zero() {
            return delay;
        }

        let mut rng = rand::rng();
        let jitter_range = delay.as_secs_f64() * factor;
        let jitter = rng.random_range(-jitter_range / 2.0..=jitter_range / 2.0);
        Duration::from_secs_f64((delay.as_secs_f64() + jitter).max(0.0))
    }

    /// Get retry metrics
    pub async fn metrics(&self) -> RetryMetrics {
        self.metrics.read().await.clone()
    }
}

/// Retry metrics for observability
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub operations: u32,
    pub total_attempts: u32,
    pub successful_operations: u32,
    pub failed_operations: u32,
    pub retries: Vec<(u32, Duration)>,
}

impl RetryMetrics {
    fn record_success(&mut self, attempt: u32) {
        self.operations += 1;
        self.total_attempts += attempt;
        self.successful_operations += 1;
    }

    fn record_failure(&mut self, attempt: u32) {
        self.operations += 1;
        self.total_attempts += attempt;
        self.failed_operations += 1;
    }

    fn record_retry(&mut self, attempt: u32, delay: Duration) {
        self.retries.push((attempt, delay));
    }
}

// Default functions for serde
fn default_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter_factor() -> f64 {
    0.3
}

fn default_exponential_base() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    enum TestError {
        Throttled,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Throttled => write!(f, "throttled"),
                TestError::Fatal => write!(f, "fatal"),
            }
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Throttled)
        }
    }

    fn fast_config(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            backoff: BackoffStrategy::Fixed,
            initial_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_linear_delay_defaults() {
        let executor = RetryExecutor::new(RetryConfig::default());
        assert_eq!(executor.calculate_delay(1), Duration::from_millis(1000));
        assert_eq!(executor.calculate_delay(2), Duration::from_millis(1500));
        assert_eq!(executor.calculate_delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let executor = RetryExecutor::new(RetryConfig {
            backoff: BackoffStrategy::Exponential { base: 2.0 },
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            ..Default::default()
        });
        assert_eq!(executor.calculate_delay(1), Duration::from_secs(1));
        assert_eq!(executor.calculate_delay(3), Duration::from_secs(4));
        assert_eq!(executor.calculate_delay(4), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let executor = RetryExecutor::new(RetryConfig {
            jitter: true,
            jitter_factor: 0.5,
            ..Default::default()
        });
        for _ in 0..50 {
            let delay = executor.apply_jitter(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(750));
            assert!(delay <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn test_huge_exponential_base_is_capped_without_overflow() {
        let executor = RetryExecutor::new(RetryConfig {
            backoff: BackoffStrategy::Exponential { base: 1e10 },
            max_delay: Duration::from_secs(30),
            ..Default::default()
        });
        assert_eq!(executor.calculate_delay(3), Duration::from_secs(30));
        assert_eq!(executor.calculate_delay(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_degenerate_exponential_bases_do_not_panic() {
        for base in [-3.0, f64::NAN, f64::INFINITY] {
            let executor = RetryExecutor::new(RetryConfig {
                backoff: BackoffStrategy::Exponential { base },
                max_delay: Duration::from_secs(30),
                ..Default::default()
            });
            for attempt in 1..6 {
                assert!(executor.calculate_delay(attempt) <= Duration::from_secs(30));
            }
        }
    }

    #[test]
    fn test_linear_delay_saturates_at_max() {
        let executor = RetryExecutor::new(RetryConfig {
            backoff: BackoffStrategy::Linear {
                increment: Duration::from_secs(u64::MAX / 2),
            },
            max_delay: Duration::from_secs(10),
            ..Default::default()
        });
        assert_eq!(executor.calculate_delay(5), Duration::from_secs(10));
    }

    #[test]
    fn test_out_of_range_jitter_factor_is_clamped() {
        let negative = RetryExecutor::new(RetryConfig {
            jitter: true,
            jitter_factor: -1.0,
            ..Default::default()
        });
        assert_eq!(
            negative.apply_jitter(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );

        let oversized = RetryExecutor::new(RetryConfig {
            jitter: true,
            jitter_factor: 7.5,
            ..Default::default()
        });
        for _ in 0..50 {
            let delay = oversized.apply_jitter(Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1500));
        }

        let nan = RetryExecutor::new(RetryConfig {
            jitter: true,
            jitter_factor: f64::NAN,
            ..Default::default()
        });
        assert_eq!(
            nan.apply_jitter(Duration::from_millis(1000)),
            Duration::from_millis(1000)
        );
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let executor = RetryExecutor::new(fast_config(3));
        let counter = Arc::new(RwLock::new(0));

        let result = executor
            .execute_with_retry(
                || {
                    let counter = counter.clone();
                    async move {
                        let mut count = counter.write().await;
                        *count += 1;
                        if *count < 3 {
                            Err(TestError::Throttled)
                        } else {
                            Ok(*count)
                        }
                    }
                },
                "test",
            )
            .await;

        assert_eq!(result.ok(), Some(3));
        let metrics = executor.metrics().await;
        assert_eq!(metrics.total_attempts, 3);
        assert_eq!(metrics.retries.len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_return_original_error() {
        let executor = RetryExecutor::new(fast_config(4));
        let counter = Arc::new(RwLock::new(0));

        let result: Result<(), TestError> = executor
            .execute_with_retry(
                || {
                    let counter = counter.clone();
                    async move {
                        *counter.write().await += 1;
                        Err(TestError::Throttled)
                    }
                },
                "test",
            )
            .await;

        assert!(matches!(result, Err(TestError::Throttled)));
        assert_eq!(*counter.read().await, 4);
        assert_eq!(executor.metrics().await.failed_operations, 1);
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let executor = RetryExecutor::new(fast_config(5));
        let counter = Arc::new(RwLock::new(0));

        let result: Result<(), TestError> = executor
            .execute_with_retry(
                || {
                    let counter = counter.clone();
                    async move {
                        *counter.write().await += 1;
                        Err(TestError::Fatal)
                    }
                },
                "test",
            )
            .await;

        assert!(matches!(result, Err(TestError::Fatal)));
        assert_eq!(*counter.read().await, 1);
        assert!(executor.metrics().await.retries.is_empty());
    }

    #[tokio::test]
    async fn test_explicit_predicate() {
        let executor = RetryExecutor::new(fast_config(2));
        let counter = Arc::new(RwLock::new(0));

        let result: Result<(), String> = executor
            .execute_with_predicate(
                || {
                    let counter = counter.clone();
                    async move {
                        *counter.write().await += 1;
                        Err("busy".to_string())
                    }
                },
                "test",
                |err: &String| err == "busy",
            )
            .await;

        assert_eq!(result, Err("busy".to_string()));
        assert_eq!(*counter.read().await, 2);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
attempts: 5
initialDelay: 200ms
backoff:
  exponential:
    base: 3.0
"#;
        let config: RetryConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.attempts, 5);
        assert_eq!(config.initial_delay, Duration::from_millis(200));
        assert_eq!(config.backoff, BackoffStrategy::Exponential { base: 3.0 });
        assert_eq!(config.max_delay, Duration::from_secs(30));
    }
}
