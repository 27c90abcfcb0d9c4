//! Message types handed from the mail store to the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol-level metadata for a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub subject: String,
    /// Sender addresses, in header order.
    pub from: Vec<String>,
    pub date: Option<DateTime<Utc>>,
}

/// A message fetched from the selected mailbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedMessage {
    /// Sequence number within the selected mailbox at fetch time.
    pub seq: u32,
    /// Stable identifier used for moves.
    pub uid: u32,
    pub envelope: Envelope,
    pub body: String,
}

impl FetchedMessage {
    pub fn new(seq: u32, uid: u32, envelope: Envelope, body: impl Into<String>) -> Self {
        Self {
            seq,
            uid,
            envelope,
            body: body.into(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.envelope.subject
    }
}
