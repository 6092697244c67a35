//! The Retry Engine (spec §4.4): wraps a fallible operation and re-invokes it
//! on transient failures only, with exponential backoff between attempts.
//!
//! The engine never decides transience itself — it queries a classifier
//! predicate supplied by the caller (`wikivault_types::ApiError::is_transient`
//! for API calls, `StorageError::is_transient` for storage). Permanent
//! failures propagate on the first attempt.
//!
//! # Example
//!
//! ```
//! use wikivault_retry::{RetryPolicy, RetryStrategyConfig, calculate_delay};
//! use std::time::Duration;
//!
//! let config = RetryPolicy::Default.to_config();
//! let delay = calculate_delay(&config, 2);
//! println!("retry after: {:?}", delay);
//!
//! let custom = RetryStrategyConfig {
//!     max_attempts: 5,
//!     base_delay: Duration::from_secs(1),
//!     max_delay: Duration::from_secs(30),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy type for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay between retries - retry immediately.
    Immediate,
    /// Exponential backoff: `base * 2^attempt` (spec §4.4's default).
    #[default]
    Exponential,
    /// Linear backoff: delay increases linearly each attempt.
    Linear,
    /// Constant delay: same delay every attempt.
    Constant,
}

/// Predefined retry policies with sensible defaults for different use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Spec §4.4 default: 3 attempts, 1s base, exponential.
    #[default]
    Default,
    /// More attempts, shorter delays — used for recoverable API hiccups.
    Aggressive,
    /// Fewer attempts, longer delays.
    Conservative,
    /// Fully custom configuration.
    Custom,
}

impl RetryPolicy {
    /// Get the default retry configuration for this policy.
    pub fn to_config(&self) -> RetryStrategyConfig {
        match self {
            RetryPolicy::Default => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 3,
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(60),
                jitter: 0.0,
            },
            RetryPolicy::Aggressive => RetryStrategyConfig {
                strategy: RetryStrategyType::Exponential,
                max_attempts: 6,
                base_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
                jitter: 0.3,
            },
            RetryPolicy::Conservative => RetryStrategyConfig {
                strategy: RetryStrategyType::Linear,
                max_attempts: 3,
                base_delay: Duration::from_secs(5),
                max_delay: Duration::from_secs(60),
                jitter: 0.1,
            },
            RetryPolicy::Custom => RetryStrategyConfig::default(),
        }
    }
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    /// Strategy type for calculating delay between retries.
    #[serde(default)]
    pub strategy: RetryStrategyType,
    /// Maximum number of attempts (spec §4.4 default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay for backoff calculations.
    #[serde(default = "default_base_delay")]
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Maximum delay cap for backoff.
    #[serde(default = "default_max_delay")]
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor for randomized delays (0.0 = no jitter, 1.0 = full jitter).
    #[serde(default)]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategyType::Exponential,
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: 0.0,
        }
    }
}

/// Calculate the delay before attempt `attempt` (1-indexed, matching spec
/// §4.4's zero-indexed `base * 2^k` with `k = attempt - 1`).
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt),
        RetryStrategyType::Constant => config.base_delay,
    };

    let capped = delay.min(config.max_delay);

    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

/// Apply jitter to a delay value. A jitter factor of 0.5 means
/// `delay * (0.5..=1.5)`.
fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;

    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.r#gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).round() as u64;
    Duration::from_millis(millis)
}

/// Run a fallible operation, retrying on transient failures per `config`.
///
/// `is_transient` is the classifier (spec §4.4: "the engine does not itself
/// decide transience; it queries the classifier"). The operation receives
/// the current attempt number, starting at 1. A permanent failure — or the
/// final transient failure once `max_attempts` is exhausted — is returned to
/// the caller immediately.
pub fn retry_with_classifier<T, E>(
    config: &RetryStrategyConfig,
    is_transient: impl Fn(&E) -> bool,
    mut operation: impl FnMut(u32) -> Result<T, E>,
) -> Result<T, E> {
    let mut attempt = 1;
    loop {
        match operation(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !is_transient(&err) {
                    return Err(err);
                }
                std::thread::sleep(calculate_delay(config, attempt));
                attempt += 1;
            }
        }
    }
}

/// A retry executor bound to a fixed configuration, for callers that want to
/// reuse the same policy across many operations.
pub struct RetryExecutor {
    config: RetryStrategyConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryStrategyConfig) -> Self {
        Self { config }
    }

    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self::new(policy.to_config())
    }

    pub fn config(&self) -> &RetryStrategyConfig {
        &self.config
    }

    /// Run `operation` under this executor's configuration, classifying
    /// errors with `is_transient`.
    pub fn run<T, E>(
        &self,
        is_transient: impl Fn(&E) -> bool,
        operation: impl FnMut(u32) -> Result<T, E>,
    ) -> Result<T, E> {
        retry_with_classifier(&self.config, is_transient, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_matches_spec_defaults() {
        let config = RetryPolicy::Default.to_config();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn calculate_delay_exponential_matches_base_times_two_pow_k() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter: 0.0,
            max_attempts: 10,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&config, 3), Duration::from_secs(4));
        assert_eq!(calculate_delay(&config, 10), Duration::from_secs(60));
    }

    #[test]
    fn calculate_delay_linear() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Linear,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
            max_attempts: 10,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&config, 5), Duration::from_secs(5));
        assert_eq!(calculate_delay(&config, 15), Duration::from_secs(10));
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let config = RetryStrategyConfig {
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        };
        let mut attempts = 0;
        let result = retry_with_classifier(
            &config,
            |_: &&str| false,
            |attempt| {
                attempts = attempt;
                Err::<(), _>("permanent")
            },
        );
        assert_eq!(result, Err("permanent"));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn transient_failure_retries_until_success() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        };
        let mut attempts = 0;
        let result = retry_with_classifier(&config, |_: &&str| true, |attempt| {
            attempts = attempt;
            if attempt < 3 {
                Err("timeout")
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn transient_failure_stops_after_max_attempts() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        };
        let mut attempts = 0;
        let result = retry_with_classifier(&config, |_: &&str| true, |attempt| {
            attempts = attempt;
            Err::<(), _>("still timing out")
        });
        assert_eq!(result, Err("still timing out"));
        assert_eq!(attempts, 3);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Constant,
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(60),
            jitter: 0.5,
            max_attempts: 10,
        };
        for _ in 0..100 {
            let delay = calculate_delay(&config, 1);
            assert!(delay >= Duration::from_millis(5000));
            assert!(delay <= Duration::from_millis(15000));
        }
    }

    #[test]
    fn executor_runs_through_classifier() {
        let executor = RetryExecutor::from_policy(RetryPolicy::Default);
        let result = executor.run(|_: &&str| false, |_attempt| Ok::<_, &str>("done"));
        assert_eq!(result, Ok("done"));
    }
}
