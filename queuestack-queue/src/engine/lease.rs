//! Two-phase dequeue: retrieve-then-delete with visibility leases

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

use super::message::{QueueMessage, UpdatedReceipt};
use super::store::MessageStore;
use crate::clock::offset;
use crate::error::QueueError;

/// Largest batch a single retrieve or peek may request
pub const DEFAULT_MAX_BATCH_SIZE: usize = 32;
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
pub const MIN_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(1);
pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Limits applied to leases
#[derive(Debug, Clone)]
pub struct LeasePolicy {
    pub max_batch_size: usize,
    pub default_visibility_timeout: Duration,
    pub max_visibility_timeout: Duration,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            default_visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_visibility_timeout: MAX_VISIBILITY_TIMEOUT,
        }
    }
}

/// Grants, extends and releases visibility leases on stored messages
///
/// Callers hold the queue lock for the duration of each call, which makes
/// selection and receipt rotation atomic per queue.
#[derive(Debug, Clone, Default)]
pub struct LeaseManager {
    policy: LeasePolicy,
}

impl LeaseManager {
    pub fn new(policy: LeasePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &LeasePolicy {
        &self.policy
    }

    /// Reject batch sizes outside `1..=max_batch_size`
    pub fn check_batch(&self, requested: usize) -> Result<usize, QueueError> {
        if requested == 0 || requested > self.policy.max_batch_size {
            return Err(QueueError::BatchLimitExceeded {
                requested,
                limit: self.policy.max_batch_size,
            });
        }
        Ok(requested)
    }

    /// Lease up to `max_count` visible messages
    pub fn retrieve(
        &self,
        store: &mut MessageStore,
        max_count: usize,
        visibility_timeout: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let max_count = self.check_batch(max_count)?;
        let timeout = self.lease_timeout(visibility_timeout);
        let visible_at = offset(now, timeout);

        let selected: Vec<u64> = store.visible_in_order(now).take(max_count).collect();

        let mut leased = Vec::with_capacity(selected.len());
        for sequence in selected {
            if let Some(message) = store.lease(sequence, visible_at, new_receipt()) {
                leased.push(message);
            }
        }

        debug!(
            queue = %store.queue(),
            count = leased.len(),
            timeout_secs = timeout.as_secs(),
            "Leased messages"
        );
        Ok(leased)
    }

    /// Permanently remove a leased message
    pub fn delete(
        &self,
        store: &mut MessageStore,
        message_id: &str,
        pop_receipt: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        Self::validate_receipt(store, message_id, pop_receipt, now)?;
        store.remove(message_id);
        debug!(queue = %store.queue(), message_id, "Deleted message");
        Ok(())
    }

    /// Replace the body and/or visibility of a leased message, rotating its receipt
    pub fn update(
        &self,
        store: &mut MessageStore,
        message_id: &str,
        pop_receipt: &str,
        body: Option<Bytes>,
        visibility_timeout: Duration,
        now: DateTime<Utc>,
    ) -> Result<UpdatedReceipt, QueueError> {
        Self::validate_receipt(store, message_id, pop_receipt, now)?;
        if let Some(body) = &body {
            store.check_payload(body)?;
        }

        let visible_at = offset(now, visibility_timeout.min(self.policy.max_visibility_timeout));
        let receipt = new_receipt();
        if !store.reschedule(message_id, visible_at, receipt.clone(), body) {
            return Err(receipt_expired(store.queue(), message_id));
        }
        debug!(queue = %store.queue(), message_id, visible_at = %visible_at, "Updated message lease");

        Ok(UpdatedReceipt {
            pop_receipt: receipt,
            visible_at,
        })
    }

    fn validate_receipt(
        store: &MessageStore,
        message_id: &str,
        pop_receipt: &str,
        now: DateTime<Utc>,
    ) -> Result<(), QueueError> {
        match store.get(message_id) {
            Some(message) if message.holds_lease(pop_receipt, now) => Ok(()),
            _ => Err(receipt_expired(store.queue(), message_id)),
        }
    }

    fn lease_timeout(&self, requested: Option<Duration>) -> Duration {
        let max = self.policy.max_visibility_timeout.max(MIN_VISIBILITY_TIMEOUT);
        requested
            .unwrap_or(self.policy.default_visibility_timeout)
            .clamp(MIN_VISIBILITY_TIMEOUT, max)
    }
}

fn new_receipt() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn receipt_expired(queue: &str, message_id: &str) -> QueueError {
    QueueError::ReceiptExpired {
        queue: queue.to_string(),
        message_id: message_id.to_string(),
    }
}
