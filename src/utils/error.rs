//! Error types used across `seqmq`.
//!
//! Expected empty states (no content, not found, duplicate) are not errors;
//! they are modelled as outcome enums in `broker::message`. Everything here is
//! either recoverable by a retry loop or logged and absorbed.

/// Failures of the durable store or the persistence worker.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("persistence worker is not running")]
    WorkerGone,
}

/// Rejections raised by the broker engine itself.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Failure of a single client call to the broker.
///
/// Every variant is treated the same way by the retry loop: the counter is
/// bumped and the call is attempted again.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed by broker")]
    Closed,

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    Unexpected(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Top-level error for starting and running the broker or client roles.
#[derive(Debug, thiserror::Error)]
pub enum SeqMqError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("unknown producer capability: {0}")]
    UnknownProducer(String),

    #[error("unknown consumer capability: {0}")]
    UnknownConsumer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

pub type Result<T> = std::result::Result<T, SeqMqError>;
