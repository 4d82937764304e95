use std::time::Duration;

use crate::{HandlerError, types::Message};

/// What to do with a message after a handler failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-schedule through the delayed set after `delay`
    Retry { delay: Duration },
    /// Give up and write a dead-letter record
    DeadLetter,
}

/// Linear backoff: the n-th retry waits `n * base_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration) -> Self {
        Self { base_delay }
    }

    /// Decide the fate of a failed message, bumping `retries` when it will be retried
    pub fn decide(&self, message: &mut Message, error: &HandlerError) -> RetryDecision {
        if !error.is_retryable() || !message.can_retry() {
            return RetryDecision::DeadLetter;
        }

        message.retries += 1;
        RetryDecision::Retry {
            delay: self.delay_for(message.retries),
        }
    }

    /// Backoff before the given retry
    pub fn delay_for(&self, retries: u32) -> Duration {
        self.base_delay.saturating_mul(retries)
    }
}
