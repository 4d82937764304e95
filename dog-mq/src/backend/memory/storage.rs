use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::{QueueResult, backend::QueueBackend};

type Lists = HashMap<String, VecDeque<Vec<u8>>>;
type SortedSets = HashMap<String, HashMap<Vec<u8>, f64>>;

/// In-memory backend for testing and development
///
/// Clones share the same storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    pub(crate) lists: Arc<Mutex<Lists>>,
    pub(crate) sorted_sets: Arc<Mutex<SortedSets>>,
    /// Woken on every push so blocked pops re-check their list
    pushed: Arc<Notify>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self, key: &str) -> Option<Vec<u8>> {
        self.lists.lock().get_mut(key).and_then(|list| list.pop_front())
    }

    /// Number of entries in a list
    pub fn list_len(&self, key: &str) -> usize {
        self.lists.lock().get(key).map_or(0, |list| list.len())
    }

    /// Snapshot of a list, oldest first
    pub fn list_items(&self, key: &str) -> Vec<Vec<u8>> {
        self.lists
            .lock()
            .get(key)
            .map(|list| list.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of members in a sorted set
    pub fn sorted_set_len(&self, key: &str) -> usize {
        self.sorted_sets.lock().get(key).map_or(0, |set| set.len())
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn push(&self, key: &str, value: Vec<u8>) -> QueueResult<()> {
        self.lists.lock().entry(key.to_string()).or_default().push_back(value);
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<Vec<u8>>> {
        // Too far out to represent means wait until a push
        let deadline = Instant::now().checked_add(timeout);

        loop {
            // Register interest before checking so a push in between still wakes us
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(key) {
                return Ok(Some(value));
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Ok(self.try_pop(key));
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn sorted_set_add(&self, key: &str, score: f64, member: Vec<u8>) -> QueueResult<()> {
        self.sorted_sets
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(member, score);
        Ok(())
    }

    async fn sorted_set_range_by_score(&self, key: &str, min: f64, max: f64) -> QueueResult<Vec<Vec<u8>>> {
        let sets = self.sorted_sets.lock();
        let Some(set) = sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut due: Vec<(f64, &Vec<u8>)> = set
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (*score, member))
            .collect();
        // Same ordering as Redis: score, then member bytes
        due.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));

        Ok(due.into_iter().map(|(_, member)| member.clone()).collect())
    }

    async fn sorted_set_remove(&self, key: &str, member: &[u8]) -> QueueResult<bool> {
        let mut sets = self.sorted_sets.lock();
        Ok(sets
            .get_mut(key)
            .map_or(false, |set| set.remove(member).is_some()))
    }
}
