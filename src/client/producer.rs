//! Producer side
//!
//! A `ProducerWorker` repeatedly asks its `Producer` capability for a payload,
//! stamps it with the channel's next sequence id and submits it through the
//! resilience engine. The id is taken before the first attempt, so every
//! retry of that message reuses it and the broker's duplicate check absorbs
//! repeated sends.
//!
//! A reserved message stays on the unsent list until the broker answers for
//! it. A worker stopped mid-send leaves it there, and with a sequence file the
//! next process sends that same message again before producing new ones, so
//! an id is never skipped and never reused for a different payload.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::broker::message::{ChannelKey, Message, SubmitOutcome};
use crate::client::api::BrokerApi;
use crate::client::resilience::{Cancelled, Resilience};
use crate::persistence::JsonDocument;

/// Produces one opaque payload per call.
pub trait Producer: Send + Sync {
    fn produce(&self) -> serde_json::Value;
}

/// What the sequence file holds.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct SequenceDocument {
    /// Last reserved id per channel (`P -> C`).
    pub last: BTreeMap<String, u64>,
    /// Reserved messages the broker has not answered for yet.
    #[serde(default)]
    pub unsent: Vec<Message>,
}

#[derive(Debug, Default)]
struct SequenceState {
    doc: SequenceDocument,
    // Unsent messages inherited from a previous run, still to be resent.
    resend: Vec<Message>,
    store: Option<JsonDocument<SequenceDocument>>,
}

impl SequenceState {
    fn save(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.doc) {
                error!("Failed to save producer sequence numbers: {e}");
            }
        }
    }
}

/// Sequence ids and unsent messages per channel, shared by the workers of a
/// process.
///
/// Without a store numbering starts at 1 on every start. With one, the
/// document is kept in a backup-swap file and both numbering and unsent
/// messages carry over to the next start.
#[derive(Debug, Default, Clone)]
pub struct SequenceCounters {
    inner: Arc<Mutex<SequenceState>>,
}

impl SequenceCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: JsonDocument<SequenceDocument>) -> Self {
        let doc = store.load();
        let mut resend = doc.unsent.clone();
        resend.sort_by_key(|m| m.sequence_id);
        if !resend.is_empty() {
            info!("{} unsent producer messages will be sent again", resend.len());
        }
        Self {
            inner: Arc::new(Mutex::new(SequenceState {
                doc,
                resend,
                store: Some(store),
            })),
        }
    }

    /// Take the oldest message of `channel` left unsent by a previous run.
    pub fn resume(&self, channel: &ChannelKey) -> Option<Message> {
        let mut state = self.lock();
        let index = state.resend.iter().position(|m| m.channel() == *channel)?;
        Some(state.resend.remove(index))
    }

    /// Stamp `payload` with the next id of `channel` and record it as unsent.
    pub fn reserve(&self, channel: &ChannelKey, payload: serde_json::Value) -> Message {
        let mut state = self.lock();
        let counter = state.doc.last.entry(channel.to_string()).or_insert(0);
        *counter += 1;
        let message = Message {
            producer_id: channel.producer_id.clone(),
            consumer_id: channel.consumer_id.clone(),
            sequence_id: *counter,
            payload,
        };
        state.doc.unsent.push(message.clone());
        state.save();
        message
    }

    /// The broker answered for `message`; it no longer needs sending.
    pub fn confirm(&self, message: &Message) {
        let mut state = self.lock();
        state.doc.unsent.retain(|m| {
            m.sequence_id != message.sequence_id || m.channel() != message.channel()
        });
        state.save();
    }

    pub fn last(&self, channel: &ChannelKey) -> u64 {
        self.lock().doc.last.get(&channel.to_string()).copied().unwrap_or(0)
    }

    /// Ids of `channel` reserved but not yet answered for, lowest first.
    pub fn unsent(&self, channel: &ChannelKey) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .lock()
            .doc
            .unsent
            .iter()
            .filter(|m| m.channel() == *channel)
            .map(|m| m.sequence_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn lock(&self) -> MutexGuard<'_, SequenceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct ProducerWorker {
    channel: ChannelKey,
    producer: Arc<dyn Producer>,
    api: Arc<dyn BrokerApi>,
    sequences: SequenceCounters,
    resilience: Resilience,
    interval: Duration,
}

impl ProducerWorker {
    pub fn new(
        channel: ChannelKey,
        producer: Arc<dyn Producer>,
        api: Arc<dyn BrokerApi>,
        sequences: SequenceCounters,
        resilience: Resilience,
        interval: Duration,
    ) -> Self {
        Self {
            channel,
            producer,
            api,
            sequences,
            resilience,
            interval,
        }
    }

    /// Produce and send until cancelled, pausing `interval` between messages.
    pub async fn run(self) {
        while self.produce_once().await.is_ok() {
            if self.resilience.pause(self.interval).await.is_err() {
                break;
            }
        }
        info!("Producer {} stopped", self.channel.producer_id);
    }

    /// Produce one payload and send it, however many attempts that takes.
    /// A message left unsent by a previous run goes first.
    pub async fn produce_once(&self) -> Result<SubmitOutcome, Cancelled> {
        let producer_id = &self.channel.producer_id;
        let message = match self.sequences.resume(&self.channel) {
            Some(message) => {
                warn!(
                    "Producer {producer_id} resending unconfirmed Sequence Number {}",
                    message.sequence_id
                );
                message
            }
            None => self.sequences.reserve(&self.channel, self.producer.produce()),
        };
        let sequence_id = message.sequence_id;

        let outcome = self
            .resilience
            .call(producer_id, "send", || self.api.submit(message.clone()))
            .await;

        match outcome {
            Ok(SubmitOutcome::Stored) => {
                self.sequences.confirm(&message);
                info!("Producer {producer_id} Sequence Number {sequence_id} -> stored");
            }
            Ok(SubmitOutcome::Duplicate) => {
                self.sequences.confirm(&message);
                warn!("Producer {producer_id} Sequence Number {sequence_id} -> duplicate ignored by broker");
            }
            Err(Cancelled) => {
                warn!("Producer {producer_id} stopped with Sequence Number {sequence_id} unconfirmed");
            }
        }
        outcome
    }
}
