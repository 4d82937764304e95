use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use serde::Serialize;

use crate::types::QueueEvent;

/// Live counters for queue operations
#[derive(Debug, Default)]
pub struct LiveMetrics {
    published: AtomicU64,
    scheduled: AtomicU64,
    promoted: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dropped: AtomicU64,
    backend_errors: AtomicU64,
    in_flight: AtomicI64,
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an event
    pub fn observe(&self, event: &QueueEvent) {
        let counter = match event {
            QueueEvent::Published { .. } => &self.published,
            QueueEvent::Scheduled { .. } => &self.scheduled,
            QueueEvent::Promoted { .. } => &self.promoted,
            QueueEvent::Delivered { .. } => &self.delivered,
            QueueEvent::Retrying { .. } => &self.retried,
            QueueEvent::DeadLettered { .. } => &self.dead_lettered,
            QueueEvent::Dropped { .. } => &self.dropped,
            QueueEvent::BackendError { .. } => &self.backend_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// A processing task took a worker slot
    pub fn task_started(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    /// A processing task released its worker slot
    pub fn task_finished(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            scheduled: self.scheduled.load(Ordering::Relaxed),
            promoted: self.promoted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed).max(0) as u64,
        }
    }
}

/// Counter values at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub scheduled: u64,
    pub promoted: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub dropped: u64,
    pub backend_errors: u64,
    pub in_flight: u64,
}

impl MetricsSnapshot {
    /// Share of handler outcomes that ended in the dead-letter list, as a percentage
    pub fn dead_letter_rate(&self) -> f64 {
        let outcomes = self.delivered + self.dead_lettered;
        if outcomes == 0 {
            0.0
        } else {
            (self.dead_lettered as f64 / outcomes as f64) * 100.0
        }
    }
}
