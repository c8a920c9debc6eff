use serde::{Deserialize, Serialize};

use crate::broker::message::Message;

/// One request frame from a producer or consumer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Request {
    #[serde(rename = "submit")]
    Submit { message: Message },
    #[serde(rename = "fetch")]
    Fetch {
        producer_id: String,
        consumer_id: String,
    },
    #[serde(rename = "ack")]
    Ack {
        producer_id: String,
        consumer_id: String,
        sequence_id: u64,
    },
    #[serde(rename = "probe")]
    Probe,
}

/// The broker's answer to exactly one `Request`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Response {
    #[serde(rename = "stored")]
    Stored,
    #[serde(rename = "duplicate")]
    Duplicate,
    #[serde(rename = "message")]
    Message { message: Message },
    #[serde(rename = "no_content")]
    NoContent,
    #[serde(rename = "acknowledged")]
    Acknowledged,
    #[serde(rename = "not_found")]
    NotFound,
    #[serde(rename = "alive")]
    Alive,
    #[serde(rename = "error")]
    Error { message: String },
}
