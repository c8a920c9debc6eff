//! Data model for the broker
//!
//! A `Message` travels on one channel, identified by the
//! `(producer_id, consumer_id)` pair, and carries a producer-assigned
//! `sequence_id` that is unique within that channel. The payload is opaque to
//! the broker; it is kept as raw JSON so producers can send any value.
//!
//! The outcome enums model the expected, non-error results of each operation
//! (duplicate submit, empty fetch, unknown acknowledgement).

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::BrokerError;

/// Identifies a channel. Ordering is only guaranteed within one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub producer_id: String,
    pub consumer_id: String,
}

impl ChannelKey {
    pub fn new(producer_id: impl Into<String>, consumer_id: impl Into<String>) -> Self {
        Self {
            producer_id: producer_id.into(),
            consumer_id: consumer_id.into(),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.producer_id, self.consumer_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub producer_id: String,
    pub consumer_id: String,
    pub sequence_id: u64,
    pub payload: serde_json::Value,
}

impl Message {
    pub fn channel(&self) -> ChannelKey {
        ChannelKey::new(self.producer_id.clone(), self.consumer_id.clone())
    }

    /// Reject messages the broker could never deliver: the cursor starts at 1
    /// and channels need both identities.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.producer_id.is_empty() || self.consumer_id.is_empty() {
            return Err(BrokerError::InvalidMessage(
                "producer_id and consumer_id must not be empty".to_string(),
            ));
        }
        if self.sequence_id == 0 {
            return Err(BrokerError::InvalidMessage(
                "sequence id must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// A removal instruction for one delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub producer_id: String,
    pub consumer_id: String,
    pub sequence_id: u64,
}

impl Acknowledgement {
    pub fn for_message(message: &Message) -> Self {
        Self {
            producer_id: message.producer_id.clone(),
            consumer_id: message.consumer_id.clone(),
            sequence_id: message.sequence_id,
        }
    }

    pub fn channel(&self) -> ChannelKey {
        ChannelKey::new(self.producer_id.clone(), self.consumer_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Stored,
    /// Same sequence id already pending; the first payload is kept.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Delivered(Message),
    NoContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    NotFound,
}
