//! # dog-mq: Topic-Based Message Queue
//!
//! **At-least-once delivery over a list/sorted-set store**
//!
//! Producers publish opaque byte payloads to named topics, immediately or
//! after a delay. Consumers register async handlers per topic; every handler
//! of a topic sees every message, runs on a bounded worker pool, and failed
//! deliveries are retried with linear backoff until the retry budget runs out,
//! at which point the message lands in the topic's dead-letter list.
//!
//! ## Features
//!
//! - **Pluggable Storage**: in-memory backend for tests and single processes, Redis behind the `redis` feature
//! - **Delayed Delivery**: a background scheduler promotes due messages from one shared delayed set
//! - **Per-Handler Retries**: a failing handler never causes redelivery to handlers that succeeded
//! - **Bounded Concurrency**: one semaphore caps in-flight handlers across all topics
//! - **Structured Observability**: `tracing` spans, a broadcast event stream, live counters
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dog_mq::prelude::*;
//! use std::time::Duration;
//!
//! # async fn run() -> QueueResult<()> {
//! let queue = QueueAdapter::new(MemoryBackend::new(), QueueConfig::default())?;
//!
//! queue.subscribe("emails", |_ctx: HandlerCtx, message: Message| async move {
//!     let address = String::from_utf8(message.payload)
//!         .map_err(|e| HandlerError::permanent(e.to_string()))?;
//!     println!("sending to {}", address);
//!     Ok::<(), HandlerError>(())
//! })?;
//!
//! queue.publish("emails", "ops@example.com").await?;
//! queue.publish_delayed("emails", "later@example.com", Duration::from_secs(5)).await?;
//!
//! queue.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod backend;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod handler;
pub mod observability;
pub mod scheduler;
pub mod types;

// Core API exports
pub use adapter::QueueAdapter;
pub use config::QueueConfig;
pub use error::{HandlerError, QueueError, QueueResult};
pub use types::{DeadLetter, HandlerCtx, Message, MessageId, QueueEvent, SubscriptionId};
pub use codec::MessageCodec;
pub use codec::json::JsonCodec;
pub use handler::MessageHandler;
pub use backend::QueueBackend;

// Observability exports
pub use observability::{LiveMetrics, MetricsSnapshot};

#[cfg(feature = "tracing-basic")]
pub use observability::init_tracing;

// Backend implementations
#[cfg(feature = "memory")]
pub use backend::memory::MemoryBackend;

#[cfg(feature = "redis")]
pub use backend::redis::RedisBackend;

/// Everything needed to publish and consume
pub mod prelude {
    pub use crate::{
        HandlerCtx, HandlerError, Message, MessageHandler, MessageId, QueueAdapter, QueueBackend,
        QueueConfig, QueueError, QueueEvent, QueueResult, SubscriptionId,
    };

    #[cfg(feature = "memory")]
    pub use crate::MemoryBackend;

    #[cfg(feature = "redis")]
    pub use crate::RedisBackend;

    pub use async_trait::async_trait;
}
