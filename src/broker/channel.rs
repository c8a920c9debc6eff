//! Channel queues
//!
//! A `ChannelQueue` holds the pending messages of one channel ordered by
//! sequence id, so the head is always the lowest pending id no matter in
//! which order producers submitted. At most one message per sequence id is
//! present at a time.
//!
//! Concurrency note: callers must synchronize access (the broker lock).

use std::collections::{BTreeMap, HashMap};

use crate::broker::message::{ChannelKey, Message};

#[derive(Debug, Default, Clone)]
pub struct ChannelQueue {
    pending: BTreeMap<u64, Message>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a message. Returns `false` and leaves the queue untouched if the
    /// sequence id is already pending.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.pending.contains_key(&message.sequence_id) {
            return false;
        }
        self.pending.insert(message.sequence_id, message);
        true
    }

    /// Lowest pending message, if any.
    pub fn head(&self) -> Option<&Message> {
        self.pending.values().next()
    }

    pub fn remove(&mut self, sequence_id: u64) -> Option<Message> {
        self.pending.remove(&sequence_id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn sequence_ids(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.pending.values()
    }
}

/// All channel queues of the broker, keyed by channel.
#[derive(Debug, Default)]
pub struct ChannelTable {
    queues: HashMap<ChannelKey, ChannelQueue>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table from a flat list, as stored by the durable store.
    /// Later duplicates of a sequence id are dropped.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut table = Self::new();
        for message in messages {
            table.queue_mut(&message.channel()).insert(message);
        }
        table
    }

    pub fn queue(&self, key: &ChannelKey) -> Option<&ChannelQueue> {
        self.queues.get(key)
    }

    /// Get the queue for a channel, creating it on first use.
    pub fn queue_mut(&mut self, key: &ChannelKey) -> &mut ChannelQueue {
        self.queues.entry(key.clone()).or_default()
    }

    pub fn existing_mut(&mut self, key: &ChannelKey) -> Option<&mut ChannelQueue> {
        self.queues.get_mut(key)
    }

    pub fn channels(&self) -> impl Iterator<Item = (&ChannelKey, &ChannelQueue)> {
        self.queues.iter()
    }

    /// Flat, deterministic copy of every pending message (by channel, then
    /// sequence id). This is the message document written to disk.
    pub fn snapshot(&self) -> Vec<Message> {
        let mut keys: Vec<&ChannelKey> = self.queues.keys().collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|key| self.queues[key].messages().cloned())
            .collect()
    }
}
