use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{watch, OwnedSemaphorePermit};
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    HandlerError,
    backend::ready_key,
    engine::QueueEngine,
    execution::{RetryDecision, RetryPolicy, WorkerPool},
    handler::{HandlerRegistry, MessageHandler},
    types::{HandlerCtx, Message, QueueEvent, SubscriptionId},
};

/// Runs the handlers for one popped envelope and applies the retry policy
pub struct Dispatcher {
    engine: Arc<QueueEngine>,
    registry: Arc<HandlerRegistry>,
    retry: RetryPolicy,
    handler_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    pub fn new(
        engine: Arc<QueueEngine>,
        registry: Arc<HandlerRegistry>,
        retry: RetryPolicy,
        handler_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            registry,
            retry,
            handler_timeout,
            shutdown,
        }
    }

    /// Process one envelope popped from `topic`'s ready list
    ///
    /// Never fails: undecodable bytes are dropped, handler failures go through
    /// the retry policy, store failures are logged.
    pub async fn process(&self, topic: &str, bytes: &[u8]) {
        let message = match self.engine.codec().decode_message(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable message on {}: {}", topic, e);
                self.engine.observability().record(QueueEvent::Dropped {
                    topic: topic.to_string(),
                    reason: e.to_string(),
                    at: Utc::now(),
                });
                return;
            }
        };

        let subscriptions = self.registry.subscriptions(&message.topic);

        if let Some(target) = message.subscription {
            if !subscriptions.iter().any(|(id, _)| *id == target) {
                let error = format!("subscription {} is not registered on {}", target, message.topic);
                self.give_up(message, &error).await;
                return;
            }
        }

        for (id, handler) in subscriptions {
            if !message.is_for(id) {
                continue;
            }

            debug!(
                "Delivering message {} on {} ({} bytes) to subscription {}",
                message.id,
                message.topic,
                message.payload_size(),
                id
            );

            match self.invoke(handler.as_ref(), message.clone()).await {
                Ok(()) => {
                    self.engine.observability().record(QueueEvent::Delivered {
                        message_id: message.id.clone(),
                        topic: message.topic.clone(),
                        subscription: id,
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    self.handle_failure(message.clone().for_subscription(id), id, e).await;
                }
            }
        }
    }

    /// Call a handler under the timeout, turning panics into retryable failures
    async fn invoke(&self, handler: &dyn MessageHandler, message: Message) -> Result<(), HandlerError> {
        let Some(deadline) = Instant::now().checked_add(self.handler_timeout) else {
            return Err(HandlerError::permanent(format!(
                "handler timeout {:?} is out of range",
                self.handler_timeout
            )));
        };
        let ctx = HandlerCtx::new(deadline, self.shutdown.clone());
        let call = AssertUnwindSafe(handler.handle(ctx, message)).catch_unwind();

        match tokio::time::timeout_at(deadline, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HandlerError::retryable("handler panicked")),
            Err(_) => Err(HandlerError::retryable(format!(
                "handler timed out after {:?}",
                self.handler_timeout
            ))),
        }
    }

    async fn handle_failure(&self, mut message: Message, subscription: SubscriptionId, error: HandlerError) {
        match self.retry.decide(&mut message, &error) {
            RetryDecision::Retry { delay } => match self.engine.schedule(&message, delay).await {
                Ok(due_at) => {
                    warn!(
                        "Message {} on {} failed in subscription {}, retry {}/{} in {:?}: {}",
                        message.id, message.topic, subscription, message.retries, message.max_retries, delay, error
                    );
                    self.engine.observability().record(QueueEvent::Retrying {
                        message_id: message.id.clone(),
                        topic: message.topic.clone(),
                        subscription,
                        retries: message.retries,
                        due_at,
                        error: error.to_string(),
                        at: Utc::now(),
                    });
                }
                Err(e) => {
                    // An unschedulable retry goes to the dead-letter list
                    error!("Failed to schedule retry of message {} on {}: {}", message.id, message.topic, e);
                    self.engine.observability().record(QueueEvent::BackendError {
                        topic: Some(message.topic.clone()),
                        error: e.to_string(),
                        at: Utc::now(),
                    });
                    let reason = format!("{} (retry scheduling failed: {})", error.message(), e);
                    self.give_up(message, &reason).await;
                }
            },
            RetryDecision::DeadLetter => self.give_up(message, error.message()).await,
        }
    }

    async fn give_up(&self, message: Message, error: &str) {
        let id = message.id.clone();
        let topic = message.topic.clone();

        match self.engine.dead_letter(message, error).await {
            Ok(()) => error!("Message {} on {} moved to dead letter: {}", id, topic, error),
            Err(e) => {
                error!("Failed to dead-letter message {} on {}, dropping it: {}", id, topic, e);
                self.engine.observability().record(QueueEvent::Dropped {
                    topic,
                    reason: format!("dead-letter write failed: {}", e),
                    at: Utc::now(),
                });
            }
        }
    }
}

/// Pulls envelopes from one topic's ready list and hands them to workers
pub struct ConsumerLoop {
    topic: String,
    engine: Arc<QueueEngine>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    pop_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl ConsumerLoop {
    pub fn new(
        topic: String,
        engine: Arc<QueueEngine>,
        dispatcher: Arc<Dispatcher>,
        pool: WorkerPool,
        pop_timeout: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            topic,
            engine,
            dispatcher,
            pool,
            pop_timeout,
            shutdown,
        }
    }

    /// Run until shutdown is signalled
    ///
    /// The pop in progress is never cancelled, so a popped envelope is always
    /// dispatched; spawned processing tasks are not awaited here.
    ///
    /// The loop pops before it waits for a worker slot, so while the pool is
    /// full one envelope per topic is held in memory rather than in the ready
    /// list. It is dispatched as soon as a slot frees.
    #[instrument(skip(self), fields(topic = %self.topic))]
    pub async fn run(mut self) {
        let key = ready_key(&self.topic);
        info!("Consumer loop started");

        while !*self.shutdown.borrow() {
            match self.engine.backend().blocking_pop(&key, self.pop_timeout).await {
                Ok(Some(bytes)) => {
                    let permit = match self.pool.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            // Pool closed under us; put the envelope back
                            error!("Worker pool unavailable, requeueing envelope: {}", e);
                            if let Err(e) = self.engine.push_ready(&self.topic, bytes).await {
                                error!("Failed to requeue envelope on {}: {}", self.topic, e);
                            }
                            break;
                        }
                    };
                    self.spawn_task(permit, bytes);
                }
                Ok(None) => continue,
                Err(e) => {
                    error!("Pop from {} failed: {}", key, e);
                    self.engine.observability().record(QueueEvent::BackendError {
                        topic: Some(self.topic.clone()),
                        error: e.to_string(),
                        at: Utc::now(),
                    });
                    // Back off, but wake early on shutdown
                    tokio::select! {
                        _ = tokio::time::sleep(self.pop_timeout) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }

        info!("Consumer loop stopped");
    }

    fn spawn_task(&self, permit: OwnedSemaphorePermit, bytes: Vec<u8>) {
        let dispatcher = self.dispatcher.clone();
        let topic = self.topic.clone();

        tokio::spawn(async move {
            let metrics = dispatcher.engine.observability().metrics();
            metrics.task_started();
            dispatcher.process(&topic, &bytes).await;
            metrics.task_finished();
            drop(permit);
        });
    }
}
