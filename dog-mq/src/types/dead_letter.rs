use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Message;

/// Terminal record for a message whose retry budget is exhausted
///
/// Serializes as the envelope's fields plus `error` and `failed_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    #[serde(flatten)]
    pub message: Message,

    /// Message of the last handler failure
    pub error: String,

    /// When the final failure happened
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: Message, error: impl Into<String>) -> Self {
        Self {
            message,
            error: error.into(),
            failed_at: Utc::now(),
        }
    }
}
