//! The broker's network contract as seen by producer and consumer workers.
//!
//! Workers only depend on this trait, so the resilience logic can be driven
//! by the real WebSocket client or by a scripted stand-in in tests.

use async_trait::async_trait;

use crate::broker::message::{AckOutcome, Acknowledgement, FetchOutcome, Message, SubmitOutcome};
use crate::utils::error::CallError;

#[async_trait]
pub trait BrokerApi: Send + Sync {
    async fn submit(&self, message: Message) -> Result<SubmitOutcome, CallError>;

    async fn fetch(&self, producer_id: &str, consumer_id: &str) -> Result<FetchOutcome, CallError>;

    async fn ack(&self, ack: Acknowledgement) -> Result<AckOutcome, CallError>;

    /// Liveness only; carries no state.
    async fn probe(&self) -> Result<(), CallError>;
}
