use crate::{
    QueueResult,
    codec::MessageCodec,
    types::{DeadLetter, EnvelopeHeader, Message},
};

/// JSON codec for envelopes
#[derive(Debug, Clone, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode_message(&self, message: &Message) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }

    fn decode_message(&self, bytes: &[u8]) -> QueueResult<Message> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn decode_header(&self, bytes: &[u8]) -> QueueResult<EnvelopeHeader> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_dead_letter(&self, record: &DeadLetter) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(record)?)
    }

    fn decode_dead_letter(&self, bytes: &[u8]) -> QueueResult<DeadLetter> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn codec_id(&self) -> &'static str {
        "json"
    }
}
