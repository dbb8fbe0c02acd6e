//! Retry policy for transient delivery failures.
//!
//! A throttled or briefly unavailable channel is retried a few times with
//! exponential backoff before the failure is treated as a channel outage.
//! Retries happen inside the permit already taken for the item, so they
//! never count against the rate limit twice.

use std::time::Duration;

use outreach_common::ConfigError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Attempts per item, including the first.
    ///
    /// Default: 3
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled for every further retry.
    ///
    /// Default: 2 seconds
    #[serde(default = "defaults::base_delay_secs")]
    pub base_delay_secs: u64,

    /// Cap on a single backoff delay.
    ///
    /// Default: 10 seconds
    #[serde(default = "defaults::max_delay_secs")]
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_secs: defaults::base_delay_secs(),
            max_delay_secs: defaults::max_delay_secs(),
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_secs: 0,
            max_delay_secs: 0,
        }
    }

    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Whether another attempt may follow `attempts_made` attempts
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }

    /// Backoff before attempt `attempts_made + 1`: `base * 2^(attempts_made - 1)`,
    /// capped at `max_delay_secs`
    #[must_use]
    pub fn backoff(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(32);
        let delay = self
            .base_delay_secs
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_secs);
        Duration::from_secs(delay)
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        3
    }

    pub const fn base_delay_secs() -> u64 {
        2
    }

    pub const fn max_delay_secs() -> u64 {
        10
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy: RetryPolicy = ron::from_str("()").unwrap();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(4), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }
}
