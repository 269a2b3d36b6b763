//! Per-queue in-memory message storage

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{btree_map, BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use super::message::{EnqueueOptions, QueueMessage, StoredMessage};
use crate::clock::offset;
use crate::error::QueueError;

/// Default cap on message body size (64 KiB)
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Ordered storage for the messages of a single queue
///
/// Messages are keyed by insertion sequence. Two ordered indexes keep
/// delivery order `(visible_at, sequence)` and expiry order
/// `(expires_at, sequence)`, so selection and purging only touch the
/// messages they return or drop.
#[derive(Debug)]
pub struct MessageStore {
    queue: String,
    messages: BTreeMap<u64, StoredMessage>,
    index: HashMap<String, u64>,
    delivery: BTreeSet<(DateTime<Utc>, u64)>,
    expiry: BTreeSet<(DateTime<Utc>, u64)>,
    next_sequence: u64,
    max_message_bytes: usize,
}

impl MessageStore {
    pub fn new(queue: impl Into<String>, max_message_bytes: usize) -> Self {
        Self {
            queue: queue.into(),
            messages: BTreeMap::new(),
            index: HashMap::new(),
            delivery: BTreeSet::new(),
            expiry: BTreeSet::new(),
            next_sequence: 0,
            max_message_bytes,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn enqueue(
        &mut self,
        body: Bytes,
        options: &EnqueueOptions,
        now: DateTime<Utc>,
    ) -> Result<QueueMessage, QueueError> {
        self.check_payload(&body)?;
        if let Some(ttl) = options.time_to_live {
            // The message must outlive its initial delay or it could never be delivered.
            if ttl <= options.initial_delay {
                return Err(QueueError::InvalidTimeToLive {
                    time_to_live: ttl,
                    initial_delay: options.initial_delay,
                });
            }
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let message = StoredMessage {
            sequence,
            id: uuid::Uuid::new_v4().to_string(),
            body,
            enqueued_at: now,
            visible_at: offset(now, options.initial_delay),
            expires_at: options.time_to_live.map(|ttl| offset(now, ttl)),
            dequeue_count: 0,
            pop_receipt: None,
        };
        let snapshot = message.to_peeked();

        self.index.insert(message.id.clone(), sequence);
        self.delivery.insert(message.delivery_key());
        if let Some(expires_at) = message.expires_at {
            self.expiry.insert((expires_at, sequence));
        }
        self.messages.insert(sequence, message);

        debug!(queue = %self.queue, message_id = %snapshot.id, sequence, "Stored message");
        Ok(snapshot)
    }

    /// Up to `max_count` visible messages in delivery order, leaving state untouched
    pub fn peek(&self, max_count: usize, now: DateTime<Utc>) -> Vec<QueueMessage> {
        self.visible_in_order(now)
            .take(max_count)
            .filter_map(|sequence| self.messages.get(&sequence))
            .map(StoredMessage::to_peeked)
            .collect()
    }

    /// Every stored message in insertion order, visible or leased
    pub(crate) fn list_all(&self) -> btree_map::Values<'_, u64, StoredMessage> {
        self.messages.values()
    }

    /// Remove every message, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let dropped = self.messages.len();
        self.messages.clear();
        self.index.clear();
        self.delivery.clear();
        self.expiry.clear();
        dropped
    }

    /// Drop messages whose time-to-live has elapsed
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut purged = 0;
        while let Some(&(expires_at, sequence)) = self.expiry.first() {
            if expires_at > now {
                break;
            }
            self.remove_sequence(sequence);
            purged += 1;
        }
        if purged > 0 {
            debug!(queue = %self.queue, count = purged, "Purged expired messages");
        }
        purged
    }

    pub(crate) fn check_payload(&self, body: &Bytes) -> Result<(), QueueError> {
        if body.len() > self.max_message_bytes {
            return Err(QueueError::InvalidPayload {
                size: body.len(),
                limit: self.max_message_bytes,
            });
        }
        Ok(())
    }

    /// Sequences of visible, unexpired messages in delivery order
    pub(crate) fn visible_in_order(&self, now: DateTime<Utc>) -> impl Iterator<Item = u64> + '_ {
        self.delivery
            .range(..=(now, u64::MAX))
            .map(|&(_, sequence)| sequence)
            .filter(move |sequence| {
                self.messages
                    .get(sequence)
                    .is_some_and(|m| !m.is_expired(now))
            })
    }

    pub(crate) fn get(&self, id: &str) -> Option<&StoredMessage> {
        self.messages.get(self.index.get(id)?)
    }

    /// Hand out a new lease on a message, returning it with the receipt
    pub(crate) fn lease(
        &mut self,
        sequence: u64,
        visible_at: DateTime<Utc>,
        receipt: String,
    ) -> Option<QueueMessage> {
        let message = self.messages.get_mut(&sequence)?;
        self.delivery.remove(&message.delivery_key());
        message.visible_at = visible_at;
        message.dequeue_count += 1;
        message.pop_receipt = Some(receipt);
        self.delivery.insert(message.delivery_key());
        Some(message.to_leased())
    }

    /// Move a leased message to a new visibility time under a new receipt
    pub(crate) fn reschedule(
        &mut self,
        id: &str,
        visible_at: DateTime<Utc>,
        receipt: String,
        body: Option<Bytes>,
    ) -> bool {
        let Some(sequence) = self.index.get(id).copied() else {
            return false;
        };
        let Some(message) = self.messages.get_mut(&sequence) else {
            return false;
        };

        self.delivery.remove(&message.delivery_key());
        if let Some(body) = body {
            message.body = body;
        }
        message.visible_at = visible_at;
        message.pop_receipt = Some(receipt);
        self.delivery.insert(message.delivery_key());
        true
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<StoredMessage> {
        let sequence = *self.index.get(id)?;
        self.remove_sequence(sequence)
    }

    fn remove_sequence(&mut self, sequence: u64) -> Option<StoredMessage> {
        let message = self.messages.remove(&sequence)?;
        self.index.remove(&message.id);
        self.delivery.remove(&message.delivery_key());
        if let Some(expires_at) = message.expires_at {
            self.expiry.remove(&(expires_at, sequence));
        }
        Some(message)
    }
}
