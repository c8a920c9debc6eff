//! Broker engine
//!
//! This module contains the broker implementation responsible for:
//! - storing submitted messages in per-channel queues, ignoring duplicates
//! - releasing messages to consumers strictly in sequence order
//! - removing messages once the consumer acknowledges them
//! - handing snapshots of its state to the persistence worker
//!
//! Concurrency and usage notes:
//! - The public API here is synchronous and designed to be held behind a
//!   single lock (`SharedBroker`) by the transport layer. Every mutation of
//!   the queues and cursors happens under that lock.
//! - Snapshots are copied while the lock is held and written by the
//!   persistence worker afterwards, so disk latency never blocks a request.
//!   A crash between a mutation and its write can lose that last mutation.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::broker::channel::ChannelTable;
use crate::broker::message::{
    AckOutcome, Acknowledgement, ChannelKey, FetchOutcome, Message, SubmitOutcome,
};
use crate::broker::sequencer::{Release, Sequencer};
use crate::persistence::{DurableStore, PersistenceHandle};
use crate::utils::error::BrokerError;

pub type SharedBroker = Arc<Mutex<Broker>>;

#[derive(Debug, Default)]
pub struct Broker {
    channels: ChannelTable,
    sequencer: Sequencer,
    persistence: Option<PersistenceHandle>,
}

impl Broker {
    /// Broker without durable state. Used by tests and throwaway setups.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate from the durable store. The store wins over anything in
    /// memory; unreadable documents come back empty.
    pub fn recover(store: &DurableStore, persistence: PersistenceHandle) -> Self {
        let channels = ChannelTable::from_messages(store.messages.load());
        let mut sequencer = Sequencer::from_entries(store.cursors.load());

        let rewound = sequencer.rewind_to_pending(&channels);
        for (key, sequence_id) in &rewound {
            warn!("Message {sequence_id} on {key} was fetched but never acknowledged. Redelivering.");
        }

        let broker = Self {
            channels,
            sequencer,
            persistence: Some(persistence),
        };
        if !rewound.is_empty() {
            broker.persist_cursors();
        }

        info!(
            "Broker state recovered: {} channels, {} pending messages",
            broker.channels.channels().count(),
            broker.channels.channels().map(|(_, q)| q.len()).sum::<usize>()
        );
        broker
    }

    pub fn into_shared(self) -> SharedBroker {
        Arc::new(Mutex::new(self))
    }

    /// Store a message in its channel queue. Submission order does not matter;
    /// the queue orders by sequence id.
    pub fn submit(&mut self, message: Message) -> Result<SubmitOutcome, BrokerError> {
        message.validate()?;
        let key = message.channel();
        let sequence_id = message.sequence_id;

        // Ids below the cursor were already delivered, even if since acknowledged.
        let delivered = sequence_id < self.sequencer.cursor(&key);
        if delivered || !self.channels.queue_mut(&key).insert(message) {
            warn!("Duplicate message ignored ({key}, sequence {sequence_id})");
            return Ok(SubmitOutcome::Duplicate);
        }

        self.persist_messages();
        info!("Message stored ({key}, sequence {sequence_id})");
        Ok(SubmitOutcome::Stored)
    }

    /// Release the channel head if, and only if, it is the next message in
    /// sequence. The message stays queued until acknowledged.
    pub fn fetch(&mut self, producer_id: &str, consumer_id: &str) -> FetchOutcome {
        let key = ChannelKey::new(producer_id, consumer_id);

        let message = match self.sequencer.check(&key, self.channels.queue(&key)) {
            Release::Ready(head) => head.clone(),
            Release::Empty => {
                warn!("No messages available for {key}");
                return FetchOutcome::NoContent;
            }
            Release::Gap { expected, head } => {
                warn!("Waiting for message {expected} on {key} (head is {head})");
                return FetchOutcome::NoContent;
            }
            Release::AwaitingAck { expected, head } => {
                warn!("Message {head} on {key} not acknowledged yet (next is {expected})");
                return FetchOutcome::NoContent;
            }
        };

        self.sequencer.advance(&key);
        self.persist_cursors();
        info!("Message {} sent to {}", message.sequence_id, key.consumer_id);
        FetchOutcome::Delivered(message)
    }

    /// Remove an acknowledged message. Unknown or repeated acknowledgements
    /// are reported as `NotFound` and change nothing. Acknowledging the message
    /// the cursor is waiting on (redelivery after a restart) moves the cursor
    /// past it.
    pub fn acknowledge(&mut self, ack: &Acknowledgement) -> AckOutcome {
        let key = ack.channel();

        let removed = self
            .channels
            .existing_mut(&key)
            .and_then(|queue| queue.remove(ack.sequence_id))
            .is_some();

        if !removed {
            warn!("Message {} on {key} not found for acknowledgement", ack.sequence_id);
            return AckOutcome::NotFound;
        }

        self.persist_messages();
        // A rewound cursor must not wait on a message that is gone.
        if self.sequencer.settle(&key, ack.sequence_id) {
            self.persist_cursors();
        }
        info!("Message {} on {key} acknowledged and removed", ack.sequence_id);
        AckOutcome::Acknowledged
    }

    /// Pending sequence ids of a channel, lowest first.
    pub fn pending(&self, key: &ChannelKey) -> Vec<u64> {
        self.channels
            .queue(key)
            .map(|queue| queue.sequence_ids())
            .unwrap_or_default()
    }

    pub fn cursor(&self, key: &ChannelKey) -> u64 {
        self.sequencer.cursor(key)
    }

    fn persist_messages(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save_messages(self.channels.snapshot());
        }
    }

    fn persist_cursors(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save_cursors(self.sequencer.snapshot());
        }
    }
}
