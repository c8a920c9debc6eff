//! Consumer side
//!
//! A `ConsumerWorker` polls its channel, hands each delivered payload to its
//! `Consumer` capability and then acknowledges it. A failed acknowledgement
//! is retried for the same sequence id; re-fetching would find the cursor
//! already past the message.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::message::{AckOutcome, Acknowledgement, ChannelKey, FetchOutcome};
use crate::client::api::BrokerApi;
use crate::client::resilience::{Cancelled, Resilience};

/// Consumes one opaque payload per call.
pub trait Consumer: Send + Sync {
    fn consume(&self, payload: &serde_json::Value);
}

pub struct ConsumerWorker {
    channel: ChannelKey,
    consumer: Arc<dyn Consumer>,
    api: Arc<dyn BrokerApi>,
    resilience: Resilience,
    interval: Duration,
}

impl ConsumerWorker {
    pub fn new(
        channel: ChannelKey,
        consumer: Arc<dyn Consumer>,
        api: Arc<dyn BrokerApi>,
        resilience: Resilience,
        interval: Duration,
    ) -> Self {
        Self {
            channel,
            consumer,
            api,
            resilience,
            interval,
        }
    }

    pub async fn run(self) {
        while self.consume_once().await.is_ok() {
            if self.resilience.pause(self.interval).await.is_err() {
                break;
            }
        }
        info!("Consumer {} stopped", self.channel.consumer_id);
    }

    /// One fetch → consume → ack cycle. Returns the consumed sequence id, or
    /// `None` when nothing was ready.
    pub async fn consume_once(&self) -> Result<Option<u64>, Cancelled> {
        let ChannelKey {
            producer_id,
            consumer_id,
        } = &self.channel;

        let fetched = self
            .resilience
            .call(consumer_id, "fetch", || self.api.fetch(producer_id, consumer_id))
            .await?;

        let message = match fetched {
            FetchOutcome::Delivered(message) => message,
            FetchOutcome::NoContent => {
                debug!("Consumer {consumer_id} -> No messages available.");
                return Ok(None);
            }
        };

        self.consumer.consume(&message.payload);

        let ack = Acknowledgement::for_message(&message);
        let outcome = self
            .resilience
            .call(consumer_id, "ack", || self.api.ack(ack.clone()))
            .await?;

        match outcome {
            AckOutcome::Acknowledged => {
                info!("Consumer {consumer_id} -> ACK sent for Sequence {}", ack.sequence_id);
            }
            AckOutcome::NotFound => {
                warn!("Consumer {consumer_id} -> Sequence {} was already acknowledged", ack.sequence_id);
            }
        }
        Ok(Some(message.sequence_id))
    }
}
