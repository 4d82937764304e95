use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use crate::{
    observability::{LiveMetrics, MetricsSnapshot},
    types::QueueEvent,
};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Fans queue events out to metrics and stream subscribers
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<QueueEvent>,
    metrics: Arc<LiveMetrics>,
}

impl ObservabilityLayer {
    pub fn new(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity);
        Self {
            event_broadcaster,
            metrics: Arc::new(LiveMetrics::new()),
        }
    }

    /// Count and broadcast an event
    pub fn record(&self, event: QueueEvent) {
        self.metrics.observe(&event);
        // No subscribers is fine
        let _ = self.event_broadcaster.send(event);
    }

    /// Stream of events recorded from now on; lagging subscribers skip missed events
    pub fn event_stream(&self) -> BoxStream<QueueEvent> {
        let stream = BroadcastStream::new(self.event_broadcaster.subscribe())
            .filter_map(|result| result.ok());
        Box::pin(stream)
    }

    pub fn metrics(&self) -> &LiveMetrics {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
