use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, SubscriptionId};

/// Message envelope - the unit of transport stored in topic lists and the delayed set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (tracing only, not used for deduplication)
    pub id: MessageId,

    /// Topic the message is routed to
    pub topic: String,

    /// Opaque producer-defined bytes
    pub payload: Vec<u8>,

    /// When the message was first published
    pub created_at: DateTime<Utc>,

    /// Failed delivery attempts so far
    pub retries: u32,

    /// Retry budget fixed at publish time
    pub max_retries: u32,

    /// Set on retried copies so only the handler that failed sees them again
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionId>,
}

impl Message {
    /// Create a fresh message with `retries = 0`
    pub fn new(topic: impl Into<String>, payload: Vec<u8>, max_retries: u32) -> Self {
        Self {
            id: MessageId::new(),
            topic: topic.into(),
            payload,
            created_at: Utc::now(),
            retries: 0,
            max_retries,
            subscription: None,
        }
    }

    /// Target a single subscription
    pub fn for_subscription(mut self, subscription: SubscriptionId) -> Self {
        self.subscription = Some(subscription);
        self
    }

    /// Check if another delivery attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.retries < self.max_retries
    }

    /// Check if this message goes to the given subscription
    pub fn is_for(&self, subscription: SubscriptionId) -> bool {
        self.subscription.map_or(true, |target| target == subscription)
    }

    /// Get the payload size in bytes
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// The routing fields of an envelope, decoded without touching the payload
#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeHeader {
    pub id: MessageId,
    pub topic: String,
}
