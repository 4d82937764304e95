use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{QueueError, QueueResult};

/// Bounded-concurrency gate shared by every consumer loop
///
/// A permit is held for the whole life of one processing task and released
/// when the task ends, whatever the handler outcome.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free worker slot
    pub async fn acquire(&self) -> QueueResult<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| QueueError::Closed)
    }

    /// Wait until every slot is free, then close the pool
    ///
    /// Used on shutdown: returns once all in-flight tasks have released their permits.
    pub async fn drain(&self) -> QueueResult<()> {
        let permits = self.capacity as u32;
        let all = self
            .semaphore
            .acquire_many(permits)
            .await
            .map_err(|_| QueueError::Closed)?;
        all.forget();
        self.semaphore.close();
        Ok(())
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
