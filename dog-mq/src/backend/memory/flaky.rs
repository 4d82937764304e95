use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use async_trait::async_trait;

use crate::{
    QueueError, QueueResult,
    backend::{memory::MemoryBackend, QueueBackend},
};

/// Memory backend whose operations can be switched to fail
#[derive(Default)]
pub struct FlakyBackend {
    pub inner: MemoryBackend,
    pub fail_push: AtomicBool,
    pub fail_pop: AtomicBool,
    pub fail_add: AtomicBool,
}

impl FlakyBackend {
    pub fn over(inner: MemoryBackend) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn set(flag: &AtomicBool, failing: bool) {
        flag.store(failing, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> QueueResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(QueueError::backend("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for FlakyBackend {
    async fn push(&self, key: &str, value: Vec<u8>) -> QueueResult<()> {
        Self::check(&self.fail_push)?;
        self.inner.push(key, value).await
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<Vec<u8>>> {
        Self::check(&self.fail_pop)?;
        self.inner.blocking_pop(key, timeout).await
    }

    async fn sorted_set_add(&self, key: &str, score: f64, member: Vec<u8>) -> QueueResult<()> {
        Self::check(&self.fail_add)?;
        self.inner.sorted_set_add(key, score, member).await
    }

    async fn sorted_set_range_by_score(&self, key: &str, min: f64, max: f64) -> QueueResult<Vec<Vec<u8>>> {
        self.inner.sorted_set_range_by_score(key, min, max).await
    }

    async fn sorted_set_remove(&self, key: &str, member: &[u8]) -> QueueResult<bool> {
        self.inner.sorted_set_remove(key, member).await
    }
}
