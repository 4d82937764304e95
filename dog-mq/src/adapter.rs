use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::{
    QueueConfig, QueueError, QueueResult,
    backend::QueueBackend,
    codec::{json::JsonCodec, MessageCodec},
    engine::QueueEngine,
    execution::{ConsumerLoop, Dispatcher, RetryPolicy, WorkerPool},
    handler::{HandlerRegistry, MessageHandler},
    observability::{BoxStream, MetricsSnapshot, ObservabilityLayer},
    scheduler::DelayedScheduler,
    types::{Message, MessageId, QueueEvent, SubscriptionId},
};

/// Topic-based message queue over a [`QueueBackend`]
///
/// Cheap to clone; clones share the same workers and background tasks.
/// Must be created inside a Tokio runtime, since it starts the delayed
/// scheduler immediately. Call [`QueueAdapter::close`] once to shut down.
pub struct QueueAdapter<B: QueueBackend + ?Sized> {
    backend: Arc<B>,
    engine: Arc<QueueEngine>,
    registry: Arc<HandlerRegistry>,
    dispatcher: Arc<Dispatcher>,
    pool: WorkerPool,
    config: QueueConfig,
    runtime: Handle,
    shutdown_tx: Arc<watch::Sender<bool>>,
    /// Consumer loops and the scheduler; the lock also orders subscribe against close
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<B: QueueBackend + 'static> QueueAdapter<B> {
    /// Create a queue using the JSON wire format
    pub fn new(backend: B, config: QueueConfig) -> QueueResult<Self> {
        Self::with_codec(backend, config, Arc::new(JsonCodec))
    }

    /// Create a queue with a custom wire format
    pub fn with_codec(backend: B, config: QueueConfig, codec: Arc<dyn MessageCodec>) -> QueueResult<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| QueueError::Internal("QueueAdapter must be created inside a Tokio runtime".to_string()))?;

        let backend = Arc::new(backend);
        let observability = ObservabilityLayer::new(config.event_buffer);
        let engine = Arc::new(QueueEngine::new(
            backend.clone() as Arc<dyn QueueBackend>,
            codec,
            observability,
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(HandlerRegistry::new());
        let dispatcher = Arc::new(Dispatcher::new(
            engine.clone(),
            registry.clone(),
            RetryPolicy::new(config.retry_base_delay),
            config.handler_timeout,
            shutdown_rx.clone(),
        ));

        let scheduler = DelayedScheduler::new(engine.clone(), config.delayed_poll_interval, shutdown_rx);
        let scheduler_handle = runtime.spawn(scheduler.run());

        info!(
            "Queue started with {} workers, default max retries {}",
            config.max_workers, config.default_max_retries
        );

        Ok(Self {
            backend,
            engine,
            registry,
            dispatcher,
            pool: WorkerPool::new(config.max_workers),
            config,
            runtime,
            shutdown_tx: Arc::new(shutdown_tx),
            tasks: Arc::new(Mutex::new(vec![scheduler_handle])),
        })
    }

    /// Publish a payload for immediate delivery with the default retry budget
    pub async fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>) -> QueueResult<MessageId> {
        self.publish_with_retries(topic, payload, self.config.default_max_retries).await
    }

    /// Publish a payload for immediate delivery with an explicit retry budget
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn publish_with_retries(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        max_retries: u32,
    ) -> QueueResult<MessageId> {
        let message = Message::new(topic, payload.into(), max_retries);
        self.engine.publish(&message).await?;
        Ok(message.id)
    }

    /// Serialize a value as JSON and publish it
    pub async fn publish_json<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> QueueResult<MessageId> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, payload).await
    }

    /// Publish a payload that becomes deliverable after `delay`
    ///
    /// A zero delay still goes through the delayed set and is picked up on
    /// the scheduler's next tick.
    pub async fn publish_delayed(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        delay: Duration,
    ) -> QueueResult<MessageId> {
        self.publish_delayed_with_retries(topic, payload, delay, self.config.default_max_retries)
            .await
    }

    /// Delayed publish with an explicit retry budget
    #[instrument(skip_all, fields(topic = %topic))]
    pub async fn publish_delayed_with_retries(
        &self,
        topic: &str,
        payload: impl Into<Vec<u8>>,
        delay: Duration,
        max_retries: u32,
    ) -> QueueResult<MessageId> {
        let message = Message::new(topic, payload.into(), max_retries);
        self.engine.schedule(&message, delay).await?;
        Ok(message.id)
    }

    /// Register a handler for a topic, starting the topic's consumer loop on first use
    ///
    /// Every handler of a topic receives every message (fan-out) and keeps
    /// its own retry budget.
    #[instrument(skip_all, fields(topic = %topic))]
    pub fn subscribe<H: MessageHandler>(&self, topic: &str, handler: H) -> QueueResult<SubscriptionId> {
        let mut tasks = self.tasks.lock();
        if *self.shutdown_tx.borrow() {
            return Err(QueueError::Closed);
        }

        let (id, first) = self.registry.register(topic, Arc::new(handler));
        if first {
            let consumer = ConsumerLoop::new(
                topic.to_string(),
                self.engine.clone(),
                self.dispatcher.clone(),
                self.pool.clone(),
                self.config.pop_timeout,
                self.shutdown_tx.subscribe(),
            );
            tasks.push(self.runtime.spawn(consumer.run()));
        }

        info!("Subscribed handler {} to {}", id, topic);
        Ok(id)
    }

    /// Stop consuming and wait for every background task and in-flight handler
    ///
    /// Consumer loops finish their current pop, the scheduler stops ticking,
    /// and handlers already running are allowed to complete. Due delayed items
    /// stay in the store for the next process.
    pub async fn close(&self) -> QueueResult<()> {
        let handles = {
            let mut tasks = self.tasks.lock();
            self.shutdown_tx.send_replace(true);
            std::mem::take(&mut *tasks)
        };

        let mut result = Ok(());
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Background task failed during shutdown: {}", e);
                result = Err(QueueError::Internal(format!("Background task join error: {}", e)));
            }
        }

        // Fails only when already drained by an earlier close
        let _ = self.pool.drain().await;

        info!("Queue closed");
        result
    }

    /// Check if close has been called
    pub fn is_closed(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Event stream for observability
    pub fn events(&self) -> BoxStream<QueueEvent> {
        self.engine.observability().event_stream()
    }

    /// Current counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.engine.observability().snapshot()
    }

    /// Get backend reference
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Get configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Topics with at least one handler
    pub fn topics(&self) -> Vec<String> {
        self.registry.topics()
    }
}

impl<B: QueueBackend + ?Sized> Clone for QueueAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            engine: self.engine.clone(),
            registry: self.registry.clone(),
            dispatcher: self.dispatcher.clone(),
            pool: self.pool.clone(),
            config: self.config.clone(),
            runtime: self.runtime.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            tasks: self.tasks.clone(),
        }
    }
}
