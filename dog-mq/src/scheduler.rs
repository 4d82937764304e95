use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    QueueResult,
    backend::{score_at, DELAYED_KEY},
    engine::QueueEngine,
    types::QueueEvent,
};

/// Moves due envelopes from the delayed set onto their topic's ready list
pub struct DelayedScheduler {
    engine: Arc<QueueEngine>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl DelayedScheduler {
    pub fn new(engine: Arc<QueueEngine>, interval: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            engine,
            interval,
            shutdown,
        }
    }

    /// Tick until shutdown; due items left at shutdown stay in the store
    pub async fn run(mut self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Starting delayed scheduler with interval: {:?}", self.interval);

        while !*self.shutdown.borrow() {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.promote_due().await {
                        Ok(promoted) if promoted > 0 => debug!("Promoted {} delayed messages", promoted),
                        Ok(_) => {}
                        Err(e) => {
                            error!("Error scanning delayed set: {}", e);
                            self.engine.observability().record(QueueEvent::BackendError {
                                topic: None,
                                error: e.to_string(),
                                at: Utc::now(),
                            });
                        }
                    }
                }
            }
        }

        info!("Delayed scheduler stopped");
    }

    /// Run one promotion pass (also used by tests)
    ///
    /// An item is removed from the delayed set only after it reached its ready
    /// list, so a failed push is retried on the next pass. A failed removal
    /// after a successful push can deliver the item twice.
    pub async fn promote_due(&self) -> QueueResult<usize> {
        let backend = self.engine.backend();
        let now = score_at(Utc::now());
        let due = backend.sorted_set_range_by_score(DELAYED_KEY, 0.0, now).await?;
        let mut promoted = 0;

        for member in due {
            let header = match self.engine.codec().decode_header(&member) {
                Ok(header) => header,
                Err(e) => {
                    warn!("Removing undecodable delayed member: {}", e);
                    if let Err(e) = backend.sorted_set_remove(DELAYED_KEY, &member).await {
                        warn!("Failed to remove undecodable delayed member: {}", e);
                    }
                    self.engine.observability().record(QueueEvent::Dropped {
                        topic: String::new(),
                        reason: e.to_string(),
                        at: Utc::now(),
                    });
                    continue;
                }
            };

            if let Err(e) = self.engine.push_ready(&header.topic, member.clone()).await {
                warn!("Failed to promote message {} on {}, will retry: {}", header.id, header.topic, e);
                self.engine.observability().record(QueueEvent::BackendError {
                    topic: Some(header.topic.clone()),
                    error: e.to_string(),
                    at: Utc::now(),
                });
                continue;
            }

            if let Err(e) = backend.sorted_set_remove(DELAYED_KEY, &member).await {
                warn!("Promoted message {} but failed to remove it from the delayed set: {}", header.id, e);
            }

            self.engine.observability().record(QueueEvent::Promoted {
                message_id: header.id,
                topic: header.topic,
                at: Utc::now(),
            });
            promoted += 1;
        }

        Ok(promoted)
    }
}
