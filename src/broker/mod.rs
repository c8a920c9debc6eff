//! The broker: ordered per-channel queues, the delivery sequencer that gates
//! them, and the engine that ties both to persistence.

pub mod channel;
pub mod engine;
pub mod message;
pub mod sequencer;

pub use engine::{Broker, SharedBroker};
