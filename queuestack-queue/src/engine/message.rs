//! Message types

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Options for enqueueing a message
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Delay before the message first becomes visible
    pub initial_delay: Duration,
    /// Time after which the message is discarded; `None` keeps it until deleted
    pub time_to_live: Option<Duration>,
}

/// A message as held by a queue
#[derive(Debug, Clone)]
pub(crate) struct StoredMessage {
    pub sequence: u64,
    pub id: String,
    pub body: Bytes,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
    pub pop_receipt: Option<String>,
}

impl StoredMessage {
    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now >= self.visible_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// Whether `receipt` names the lease currently held on this message
    pub fn holds_lease(&self, receipt: &str, now: DateTime<Utc>) -> bool {
        self.pop_receipt.as_deref() == Some(receipt) && now < self.visible_at
    }

    /// Delivery order: earliest visibility first, then insertion order
    pub fn delivery_key(&self) -> (DateTime<Utc>, u64) {
        (self.visible_at, self.sequence)
    }

    /// Snapshot without the receipt, as returned by peek and enqueue
    pub fn to_peeked(&self) -> QueueMessage {
        QueueMessage {
            id: self.id.clone(),
            body: self.body.clone(),
            enqueued_at: self.enqueued_at,
            visible_at: self.visible_at,
            expires_at: self.expires_at,
            dequeue_count: self.dequeue_count,
            pop_receipt: None,
        }
    }

    /// Snapshot carrying the active receipt, as returned by retrieve
    pub fn to_leased(&self) -> QueueMessage {
        QueueMessage {
            pop_receipt: self.pop_receipt.clone(),
            ..self.to_peeked()
        }
    }
}

/// A message returned to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: Bytes,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
    /// Present only on retrieved messages
    pub pop_receipt: Option<String>,
}

impl QueueMessage {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Result of updating a leased message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatedReceipt {
    pub pop_receipt: String,
    pub visible_at: DateTime<Utc>,
}
