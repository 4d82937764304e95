pub mod json;

use crate::{
    QueueResult,
    types::{DeadLetter, EnvelopeHeader, Message},
};

/// Wire format for envelopes and dead-letter records
///
/// Implementations must round-trip `payload` byte-for-byte.
pub trait MessageCodec: Send + Sync {
    /// Encode an envelope for a ready list or the delayed set
    fn encode_message(&self, message: &Message) -> QueueResult<Vec<u8>>;

    /// Decode a full envelope
    fn decode_message(&self, bytes: &[u8]) -> QueueResult<Message>;

    /// Decode only the routing fields of an envelope
    fn decode_header(&self, bytes: &[u8]) -> QueueResult<EnvelopeHeader>;

    /// Encode a dead-letter record
    fn encode_dead_letter(&self, record: &DeadLetter) -> QueueResult<Vec<u8>>;

    /// Decode a dead-letter record
    fn decode_dead_letter(&self, bytes: &[u8]) -> QueueResult<DeadLetter>;

    /// Get codec identifier
    fn codec_id(&self) -> &'static str;
}
