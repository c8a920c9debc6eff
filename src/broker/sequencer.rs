//! Delivery sequencer
//!
//! Tracks, per channel, the next sequence id that may be released to the
//! consumer. The cursor starts at 1 and moves forward by exactly one on each
//! successful fetch; acknowledgements never touch it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::broker::channel::{ChannelQueue, ChannelTable};
use crate::broker::message::{ChannelKey, Message};

pub const FIRST_SEQUENCE: u64 = 1;

/// One row of the persisted cursor document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorEntry {
    pub producer_id: String,
    pub consumer_id: String,
    pub next_sequence: u64,
}

/// What the queue head means relative to the cursor.
#[derive(Debug, PartialEq)]
pub enum Release<'a> {
    /// Head matches the cursor and may be delivered.
    Ready(&'a Message),
    Empty,
    /// An earlier message has not arrived yet.
    Gap { expected: u64, head: u64 },
    /// The head was already fetched and waits for its acknowledgement.
    AwaitingAck { expected: u64, head: u64 },
}

#[derive(Debug, Default)]
pub struct Sequencer {
    cursors: HashMap<ChannelKey, u64>,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<CursorEntry>) -> Self {
        let cursors = entries
            .into_iter()
            .map(|e| {
                (
                    ChannelKey::new(e.producer_id, e.consumer_id),
                    e.next_sequence.max(FIRST_SEQUENCE),
                )
            })
            .collect();
        Self { cursors }
    }

    pub fn cursor(&self, key: &ChannelKey) -> u64 {
        self.cursors.get(key).copied().unwrap_or(FIRST_SEQUENCE)
    }

    /// Gate a channel queue against its cursor.
    pub fn check<'a>(&self, key: &ChannelKey, queue: Option<&'a ChannelQueue>) -> Release<'a> {
        let Some(head) = queue.and_then(ChannelQueue::head) else {
            return Release::Empty;
        };
        let expected = self.cursor(key);
        match head.sequence_id {
            id if id == expected => Release::Ready(head),
            id if id > expected => Release::Gap { expected, head: id },
            id => Release::AwaitingAck { expected, head: id },
        }
    }

    /// Move the cursor past the message just released. Returns the new value.
    pub fn advance(&mut self, key: &ChannelKey) -> u64 {
        let cursor = self.cursors.entry(key.clone()).or_insert(FIRST_SEQUENCE);
        *cursor += 1;
        *cursor
    }

    /// Called when `sequence_id` leaves the queue. If the cursor was waiting
    /// on exactly that message it moves past it; returns `true` when it moved.
    pub fn settle(&mut self, key: &ChannelKey, sequence_id: u64) -> bool {
        if sequence_id != self.cursor(key) {
            return false;
        }
        self.cursors.insert(key.clone(), sequence_id + 1);
        true
    }

    /// After a restart, any head below its cursor was fetched but never
    /// acknowledged. Rewind those cursors so the message is delivered again.
    pub fn rewind_to_pending(&mut self, table: &ChannelTable) -> Vec<(ChannelKey, u64)> {
        let mut rewound = Vec::new();
        for (key, queue) in table.channels() {
            let Some(head) = queue.head() else { continue };
            if head.sequence_id < self.cursor(key) {
                self.cursors.insert(key.clone(), head.sequence_id);
                rewound.push((key.clone(), head.sequence_id));
            }
        }
        rewound.sort();
        rewound
    }

    pub fn snapshot(&self) -> Vec<CursorEntry> {
        let mut entries: Vec<CursorEntry> = self
            .cursors
            .iter()
            .map(|(key, next)| CursorEntry {
                producer_id: key.producer_id.clone(),
                consumer_id: key.consumer_id.clone(),
                next_sequence: *next,
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.producer_id, &a.consumer_id).cmp(&(&b.producer_id, &b.consumer_id))
        });
        entries
    }
}
