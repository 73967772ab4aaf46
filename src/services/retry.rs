use crate::models::RetrySettings;
use crate::services::ClassificationError;
use std::time::Duration;

/// What the submission loop should do after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then make the next attempt
    Retry { delay: Duration },
    /// Stop and surface this error
    GiveUp(ClassificationError),
}

/// Exponential backoff over the transient error classes.
///
/// Pure: decisions depend only on the error and how many attempts were made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// True if `error` is transient and another attempt is still allowed.
    pub fn should_retry(&self, error: &ClassificationError, attempts_made: u32) -> bool {
        error.is_transient() && attempts_made < self.max_attempts
    }

    /// Delay before retry number `retry_index` (0-based).
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        2u32.checked_pow(retry_index)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn decide(&self, error: ClassificationError, attempts_made: u32) -> RetryDecision {
        if self.should_retry(&error, attempts_made) {
            return RetryDecision::Retry {
                delay: self.delay_for(attempts_made.saturating_sub(1)),
            };
        }

        if error.is_transient() {
            RetryDecision::GiveUp(ClassificationError::RetriesExhausted {
                attempts: attempts_made,
                last: Box::new(error),
            })
        } else {
            RetryDecision::GiveUp(error)
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.initial_delay(),
            settings.max_delay(),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}
