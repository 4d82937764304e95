#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redis")]
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::QueueResult;

/// Key of the single sorted set holding delayed envelopes
pub const DELAYED_KEY: &str = "delayed_queue";

/// Ready list key for a topic
pub fn ready_key(topic: &str) -> String {
    format!("queue:{}", topic)
}

/// Dead-letter list key for a topic
pub fn dead_letter_key(topic: &str) -> String {
    format!("dead_letter:{}", topic)
}

/// Sorted-set score for an instant: Unix seconds with millisecond precision, rounded down
///
/// Used for "now" when scanning, so nothing is seen as due early.
pub fn score_at(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

/// Score for a due instant, rounded up to the next millisecond
pub fn due_score(due_at: DateTime<Utc>) -> f64 {
    let millis = due_at.timestamp_millis();
    let partial = due_at.timestamp_subsec_nanos() % 1_000_000 != 0;
    (millis + i64::from(partial)) as f64 / 1000.0
}

/// Storage primitives the queue needs from a durable key-value store
///
/// Lists are FIFO: `push` appends, `blocking_pop` takes the oldest entry.
/// Sorted-set members are unique byte strings; adding an existing member
/// replaces its score. Implementations must be safe to share between the
/// consumer loops and the delayed scheduler.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append bytes to a list
    async fn push(&self, key: &str, value: Vec<u8>) -> QueueResult<()>;

    /// Take the oldest list entry, waiting up to `timeout`; `None` means the wait timed out
    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<Vec<u8>>>;

    /// Add a member to a sorted set
    async fn sorted_set_add(&self, key: &str, score: f64, member: Vec<u8>) -> QueueResult<()>;

    /// Members with `min <= score <= max`, lowest score first
    async fn sorted_set_range_by_score(&self, key: &str, min: f64, max: f64) -> QueueResult<Vec<Vec<u8>>>;

    /// Remove an exact member; returns whether it was present
    async fn sorted_set_remove(&self, key: &str, member: &[u8]) -> QueueResult<bool>;
}
