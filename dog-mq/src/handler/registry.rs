use std::collections::HashMap;
use std::sync::Arc;
use parking_lot::RwLock;

use crate::{handler::MessageHandler, types::SubscriptionId};

/// A handler paired with its position in the topic's registration order
pub type Subscription = (SubscriptionId, Arc<dyn MessageHandler>);

/// Topic -> handlers mapping
///
/// Registration only appends, so a `SubscriptionId` keeps naming the same
/// handler for the life of the process.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn MessageHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; the flag is true for the topic's first handler
    pub fn register(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> (SubscriptionId, bool) {
        let mut handlers = self.handlers.write();
        let topic_handlers = handlers.entry(topic.to_string()).or_default();
        let id = SubscriptionId(topic_handlers.len() as u32);
        topic_handlers.push(handler);
        (id, id.0 == 0)
    }

    /// Snapshot of a topic's handlers, taken without holding the lock during dispatch
    pub fn subscriptions(&self, topic: &str) -> Vec<Subscription> {
        self.handlers
            .read()
            .get(topic)
            .map(|handlers| {
                handlers
                    .iter()
                    .enumerate()
                    .map(|(index, handler)| (SubscriptionId(index as u32), handler.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Check if a topic has any handler
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.handlers.read().get(topic).map_or(false, |handlers| !handlers.is_empty())
    }

    /// Get all subscribed topics
    pub fn topics(&self) -> Vec<String> {
        self.handlers.read().keys().cloned().collect()
    }
}
