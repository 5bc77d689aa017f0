//! Retry policy for failed jobs.
//!
//! Max attempts and the backoff table are pure data; the executor never
//! special-cases attempt indices.

use quantra_config::JobsSettings;
use std::time::Duration;

/// Bounded retry with a fixed per-attempt backoff table.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Terminal failure threshold.
    pub max_attempts: u32,
    /// Ordered delays in seconds, indexed by completed failed attempts;
    /// out-of-range indices clamp to the last entry.
    pub backoff_secs: Vec<u64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_secs: vec![1, 3, 5],
        }
    }
}

impl RetryPolicy {
    /// Creates a policy; an empty backoff table falls back to the default.
    #[must_use]
    pub fn new(max_attempts: u32, backoff_secs: Vec<u64>) -> Self {
        let backoff_secs = if backoff_secs.is_empty() {
            Self::default().backoff_secs
        } else {
            backoff_secs
        };
        Self {
            max_attempts,
            backoff_secs,
        }
    }

    /// Returns the delay before re-executing a job with the given number of
    /// completed failed attempts. Zero attempts means no delay.
    #[must_use]
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let index = (attempts as usize - 1).min(self.backoff_secs.len() - 1);
        Duration::from_secs(self.backoff_secs[index])
    }

    /// Returns true once the attempt budget is used up.
    #[must_use]
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

impl From<&JobsSettings> for RetryPolicy {
    fn from(settings: &JobsSettings) -> Self {
        Self::new(settings.max_attempts, settings.backoff_secs.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_table() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
    }

    #[test]
    fn test_out_of_range_attempts_clamp_to_last_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(100), Duration::from_secs(5));
    }

    #[test]
    fn test_exhaustion_threshold() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert!(policy.is_exhausted(4));
    }

    #[test]
    fn test_empty_table_falls_back_to_default() {
        let policy = RetryPolicy::new(5, vec![]);
        assert_eq!(policy.backoff_secs, vec![1, 3, 5]);
        assert_eq!(policy.max_attempts, 5);
    }

    #[test]
    fn test_from_settings() {
        let mut settings = JobsSettings::default();
        settings.max_attempts = 2;
        settings.backoff_secs = vec![7];
        let policy = RetryPolicy::from(&settings);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(7));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_secs(7));
        assert!(policy.is_exhausted(2));
    }
}
