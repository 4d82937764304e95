use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};

use crate::{
    QueueError, QueueResult,
    backend::{dead_letter_key, due_score, ready_key, QueueBackend, DELAYED_KEY},
    codec::MessageCodec,
    observability::ObservabilityLayer,
    types::{DeadLetter, Message, MessageId, QueueEvent},
};

/// Store-facing half of the queue: encodes envelopes and moves them between
/// ready lists, the delayed set and dead-letter lists
pub struct QueueEngine {
    backend: Arc<dyn QueueBackend>,
    codec: Arc<dyn MessageCodec>,
    observability: ObservabilityLayer,
}

impl QueueEngine {
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        codec: Arc<dyn MessageCodec>,
        observability: ObservabilityLayer,
    ) -> Self {
        Self {
            backend,
            codec,
            observability,
        }
    }

    /// Encode a message and push it onto its topic's ready list
    pub async fn publish(&self, message: &Message) -> QueueResult<()> {
        let bytes = self.codec.encode_message(message)?;
        self.push_ready(&message.topic, bytes).await?;

        self.observability.record(QueueEvent::Published {
            message_id: message.id.clone(),
            topic: message.topic.clone(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Push already-encoded envelope bytes onto a topic's ready list
    pub async fn push_ready(&self, topic: &str, bytes: Vec<u8>) -> QueueResult<()> {
        self.backend.push(&ready_key(topic), bytes).await
    }

    /// Put a message in the delayed set, due `delay` from now
    pub async fn schedule(&self, message: &Message, delay: Duration) -> QueueResult<DateTime<Utc>> {
        let due_at = due_after(delay)?;
        let bytes = self.codec.encode_message(message)?;
        self.backend
            .sorted_set_add(DELAYED_KEY, due_score(due_at), bytes)
            .await?;

        self.observability.record(QueueEvent::Scheduled {
            message_id: message.id.clone(),
            topic: message.topic.clone(),
            due_at,
            at: Utc::now(),
        });
        Ok(due_at)
    }

    /// Write a dead-letter record to the message's topic sink
    pub async fn dead_letter(&self, message: Message, error: &str) -> QueueResult<()> {
        let message_id: MessageId = message.id.clone();
        let topic = message.topic.clone();
        let record = DeadLetter::new(message, error);
        let bytes = self.codec.encode_dead_letter(&record)?;
        self.backend.push(&dead_letter_key(&topic), bytes).await?;

        self.observability.record(QueueEvent::DeadLettered {
            message_id,
            topic,
            error: error.to_string(),
            at: record.failed_at,
        });
        Ok(())
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }

    pub fn codec(&self) -> &Arc<dyn MessageCodec> {
        &self.codec
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }
}

fn due_after(delay: Duration) -> QueueResult<DateTime<Utc>> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .ok_or_else(|| QueueError::Internal(format!("Delay out of range: {:?}", delay)))
}
