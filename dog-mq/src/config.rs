use std::time::Duration;

use crate::{QueueError, QueueResult};

/// Longest accepted timeout, interval or backoff unit (one day)
///
/// Keeps deadlines computed from these values representable.
pub const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Configuration for a queue adapter
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of handler invocations running at once, across all topics
    pub max_workers: usize,

    /// Retry budget given to messages published without an explicit one
    pub default_max_retries: u32,

    /// How long a consumer loop blocks on an empty topic before re-checking shutdown
    pub pop_timeout: Duration,

    /// Tick interval of the delayed scheduler
    pub delayed_poll_interval: Duration,

    /// Upper bound on a single handler call
    pub handler_timeout: Duration,

    /// Linear backoff unit: the n-th retry waits `n * retry_base_delay`
    pub retry_base_delay: Duration,

    /// Capacity of the event broadcast channel
    pub event_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            default_max_retries: 3,
            pop_timeout: Duration::from_secs(1),
            delayed_poll_interval: Duration::from_secs(1),
            handler_timeout: Duration::from_secs(30),
            retry_base_delay: Duration::from_secs(2),
            event_buffer: 1024,
        }
    }
}

impl QueueConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the default retry budget
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Set the blocking pop timeout
    pub fn with_pop_timeout(mut self, timeout: Duration) -> Self {
        self.pop_timeout = timeout;
        self
    }

    /// Set the delayed scheduler tick interval
    pub fn with_delayed_poll_interval(mut self, interval: Duration) -> Self {
        self.delayed_poll_interval = interval;
        self
    }

    /// Set the per-call handler timeout
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Set the linear retry backoff unit
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Set the event channel capacity
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Reject configurations that can't run
    pub fn validate(&self) -> QueueResult<()> {
        if self.max_workers == 0 {
            return Err(QueueError::InvalidConfig("max_workers must be at least 1".to_string()));
        }
        if self.pop_timeout.is_zero() {
            return Err(QueueError::InvalidConfig("pop_timeout must be non-zero".to_string()));
        }
        if self.delayed_poll_interval.is_zero() {
            return Err(QueueError::InvalidConfig(
                "delayed_poll_interval must be non-zero".to_string(),
            ));
        }
        if self.handler_timeout.is_zero() {
            return Err(QueueError::InvalidConfig("handler_timeout must be non-zero".to_string()));
        }
        if self.event_buffer == 0 {
            return Err(QueueError::InvalidConfig("event_buffer must be at least 1".to_string()));
        }
        for (name, value) in [
            ("pop_timeout", self.pop_timeout),
            ("delayed_poll_interval", self.delayed_poll_interval),
            ("handler_timeout", self.handler_timeout),
            ("retry_base_delay", self.retry_base_delay),
        ] {
            if value > MAX_DURATION {
                return Err(QueueError::InvalidConfig(format!(
                    "{} must not exceed {:?}",
                    name, MAX_DURATION
                )));
            }
        }
        // Shutdown drains the pool with a single u32 acquire
        let limit = tokio::sync::Semaphore::MAX_PERMITS.min(u32::MAX as usize);
        if self.max_workers > limit {
            return Err(QueueError::InvalidConfig(format!("max_workers exceeds {}", limit)));
        }
        Ok(())
    }
}
