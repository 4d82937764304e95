use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MessageId, SubscriptionId};

/// Minimal stable event protocol for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueEvent {
    /// Message pushed onto its topic's ready list
    Published {
        message_id: MessageId,
        topic: String,
        at: DateTime<Utc>,
    },

    /// Message placed in the delayed set
    Scheduled {
        message_id: MessageId,
        topic: String,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// Due message moved from the delayed set to its ready list
    Promoted {
        message_id: MessageId,
        topic: String,
        at: DateTime<Utc>,
    },

    /// A handler accepted the message
    Delivered {
        message_id: MessageId,
        topic: String,
        subscription: SubscriptionId,
        at: DateTime<Utc>,
    },

    /// A handler failed and the message was re-scheduled
    Retrying {
        message_id: MessageId,
        topic: String,
        subscription: SubscriptionId,
        retries: u32,
        due_at: DateTime<Utc>,
        error: String,
        at: DateTime<Utc>,
    },

    /// Retry budget exhausted (or permanent failure); message moved to the dead-letter list
    DeadLettered {
        message_id: MessageId,
        topic: String,
        error: String,
        at: DateTime<Utc>,
    },

    /// Message lost: undecodable bytes or a failed dead-letter write
    Dropped {
        topic: String,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Store operation failed inside a background task
    BackendError {
        topic: Option<String>,
        error: String,
        at: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Scheduled { .. } => "scheduled",
            Self::Promoted { .. } => "promoted",
            Self::Delivered { .. } => "delivered",
            Self::Retrying { .. } => "retrying",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Dropped { .. } => "dropped",
            Self::BackendError { .. } => "backend_error",
        }
    }

    /// Get the message ID, when the event concerns a decodable message
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Published { message_id, .. }
            | Self::Scheduled { message_id, .. }
            | Self::Promoted { message_id, .. }
            | Self::Delivered { message_id, .. }
            | Self::Retrying { message_id, .. }
            | Self::DeadLettered { message_id, .. } => Some(message_id),
            Self::Dropped { .. } | Self::BackendError { .. } => None,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Published { at, .. }
            | Self::Scheduled { at, .. }
            | Self::Promoted { at, .. }
            | Self::Delivered { at, .. }
            | Self::Retrying { at, .. }
            | Self::DeadLettered { at, .. }
            | Self::Dropped { at, .. }
            | Self::BackendError { at, .. } => at,
        }
    }
}
