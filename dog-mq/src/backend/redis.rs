use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::AsyncCommands;
use tracing::debug;

use crate::{QueueError, QueueResult, backend::QueueBackend};

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::backend(err)
    }
}

/// Redis backend: LPUSH/BRPOP lists and one ZSET for delayed envelopes
///
/// BRPOP holds its connection for the whole timeout, so every popped key gets
/// its own connection; everything else goes through a shared manager.
pub struct RedisBackend {
    client: redis::Client,
    manager: ConnectionManager,
    blocking: Mutex<HashMap<String, MultiplexedConnection>>,
}

impl RedisBackend {
    /// Connect to the given Redis URL
    pub async fn connect(url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            manager,
            blocking: Mutex::new(HashMap::new()),
        })
    }

    async fn blocking_connection(&self, key: &str) -> QueueResult<MultiplexedConnection> {
        if let Some(conn) = self.blocking.lock().get(key).cloned() {
            return Ok(conn);
        }
        debug!("Opening blocking connection for {}", key);
        let conn = self.client.get_multiplexed_async_connection().await?;
        self.blocking.lock().insert(key.to_string(), conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl QueueBackend for RedisBackend {
    async fn push(&self, key: &str, value: Vec<u8>) -> QueueResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn blocking_pop(&self, key: &str, timeout: Duration) -> QueueResult<Option<Vec<u8>>> {
        let mut conn = self.blocking_connection(key).await?;
        let popped: Result<Option<(String, Vec<u8>)>, redis::RedisError> =
            conn.brpop(key, timeout.as_secs_f64()).await;

        match popped {
            Ok(entry) => Ok(entry.map(|(_, value)| value)),
            Err(err) => {
                // Drop the connection so the next pop reconnects
                self.blocking.lock().remove(key);
                Err(err.into())
            }
        }
    }

    async fn sorted_set_add(&self, key: &str, score: f64, member: Vec<u8>) -> QueueResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.zadd(key, member, score).await?;
        Ok(())
    }

    async fn sorted_set_range_by_score(&self, key: &str, min: f64, max: f64) -> QueueResult<Vec<Vec<u8>>> {
        let mut conn = self.manager.clone();
        let members: Vec<Vec<u8>> = conn.zrangebyscore(key, min, max).await?;
        Ok(members)
    }

    async fn sorted_set_remove(&self, key: &str, member: &[u8]) -> QueueResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }
}
