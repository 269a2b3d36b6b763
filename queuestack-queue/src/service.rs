//! Queue service facade
//!
//! Validates arguments, resolves queues in the registry and runs every
//! message operation under the owning queue's lock.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::engine::{
    EnqueueOptions, LeaseManager, LeasePolicy, MessageStore, QueueMessage, QueueRegistry,
    UpdatedReceipt, DEFAULT_MAX_BATCH_SIZE, DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_VISIBILITY_TIMEOUT,
    MAX_VISIBILITY_TIMEOUT,
};
use crate::error::QueueError;
use crate::names::normalize_queue_name;

/// Engine limits and defaults
#[derive(Debug, Clone)]
pub struct QueueServiceConfig {
    pub max_batch_size: usize,
    pub max_message_bytes: usize,
    pub default_visibility_timeout: Duration,
    pub max_visibility_timeout: Duration,
    /// Applied to messages enqueued without an explicit time-to-live
    pub default_message_ttl: Option<Duration>,
    /// Fail creation of an existing queue instead of returning it
    pub strict_create: bool,
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            default_visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            max_visibility_timeout: MAX_VISIBILITY_TIMEOUT,
            default_message_ttl: None,
            strict_create: false,
        }
    }
}

/// Outcome of a create call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedQueue {
    pub name: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueProperties {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub approximate_count: u64,
}

/// Entry in a queue listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSummary {
    pub name: String,
    pub approximate_count: u64,
}

pub struct QueueService {
    registry: QueueRegistry,
    leases: LeaseManager,
    clock: Arc<dyn Clock>,
    default_message_ttl: Option<Duration>,
}

impl QueueService {
    pub fn new(config: QueueServiceConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: QueueServiceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: QueueRegistry::new(config.strict_create, config.max_message_bytes),
            leases: LeaseManager::new(LeasePolicy {
                max_batch_size: config.max_batch_size,
                default_visibility_timeout: config.default_visibility_timeout,
                max_visibility_timeout: config.max_visibility_timeout,
            }),
            clock,
            default_message_ttl: config.default_message_ttl,
        }
    }

    // === Queues ===

    pub fn create_queue(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<CreatedQueue, QueueError> {
        let name = normalize_queue_name(name)?;
        let (queue, created) = self.registry.create(&name, metadata, self.clock.now())?;
        Ok(CreatedQueue {
            name: queue.name().to_string(),
            created,
        })
    }

    /// Delete a queue and all its messages; absent queues are not an error
    pub fn delete_queue(&self, name: &str) -> Result<bool, QueueError> {
        let name = normalize_queue_name(name)?;
        Ok(self.registry.delete(&name))
    }

    pub fn get_properties(&self, name: &str) -> Result<QueueProperties, QueueError> {
        let name = normalize_queue_name(name)?;
        let queue = self.registry.get(&name)?;
        let approximate_count = self
            .registry
            .refresh_approximate_count(&name, self.clock.now())?;
        Ok(QueueProperties {
            name: queue.name().to_string(),
            created_at: queue.created_at(),
            metadata: queue.metadata(),
            approximate_count,
        })
    }

    pub fn get_metadata(&self, name: &str) -> Result<HashMap<String, String>, QueueError> {
        let name = normalize_queue_name(name)?;
        Ok(self.registry.get(&name)?.metadata())
    }

    /// Replace a queue's metadata
    pub fn set_metadata(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
    ) -> Result<(), QueueError> {
        let name = normalize_queue_name(name)?;
        self.registry.get(&name)?.set_metadata(metadata);
        info!(queue = %name, "Updated queue metadata");
        Ok(())
    }

    /// Total of visible and leased messages; not exact under concurrent use
    pub fn get_approximate_count(&self, name: &str) -> Result<u64, QueueError> {
        let name = normalize_queue_name(name)?;
        self.registry
            .refresh_approximate_count(&name, self.clock.now())
    }

    /// Queues whose names start with `prefix`, sorted by name
    pub fn list_queues(&self, prefix: Option<&str>) -> Vec<QueueSummary> {
        let prefix = prefix.map(str::to_ascii_lowercase);
        let now = self.clock.now();
        self.registry
            .list(prefix.as_deref())
            .filter_map(|queue| {
                // Skip queues deleted between listing and counting.
                let approximate_count = self
                    .registry
                    .refresh_approximate_count(queue.name(), now)
                    .ok()?;
                Some(QueueSummary {
                    name: queue.name().to_string(),
                    approximate_count,
                })
            })
            .collect()
    }

    // === Messages ===

    pub fn enqueue(
        &self,
        name: &str,
        body: Bytes,
        mut options: EnqueueOptions,
    ) -> Result<QueueMessage, QueueError> {
        if options.time_to_live.is_none() {
            options.time_to_live = self.default_message_ttl;
        }
        self.with_store(name, |store, now| {
            let message = store.enqueue(body, &options, now)?;
            info!(queue = %store.queue(), message_id = %message.id, "Enqueued message");
            Ok(message)
        })
    }

    /// Visible messages in delivery order, without leasing them
    pub fn peek(&self, name: &str, max_count: usize) -> Result<Vec<QueueMessage>, QueueError> {
        let max_count = self.leases.check_batch(max_count)?;
        self.with_store(name, |store, now| Ok(store.peek(max_count, now)))
    }

    /// Lease up to `max_count` visible messages for `visibility_timeout`
    pub fn retrieve(
        &self,
        name: &str,
        max_count: usize,
        visibility_timeout: Option<Duration>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.with_store(name, |store, now| {
            let messages = self
                .leases
                .retrieve(store, max_count, visibility_timeout, now)?;
            info!(queue = %store.queue(), count = messages.len(), "Retrieved messages");
            Ok(messages)
        })
    }

    pub fn update_message(
        &self,
        name: &str,
        message_id: &str,
        pop_receipt: &str,
        body: Option<Bytes>,
        visibility_timeout: Duration,
    ) -> Result<UpdatedReceipt, QueueError> {
        self.with_store(name, |store, now| {
            let updated =
                self.leases
                    .update(store, message_id, pop_receipt, body, visibility_timeout, now)?;
            info!(queue = %store.queue(), message_id = %message_id, "Updated message");
            Ok(updated)
        })
    }

    pub fn delete_message(
        &self,
        name: &str,
        message_id: &str,
        pop_receipt: &str,
    ) -> Result<(), QueueError> {
        self.with_store(name, |store, now| {
            self.leases.delete(store, message_id, pop_receipt, now)?;
            info!(queue = %store.queue(), message_id = %message_id, "Deleted message");
            Ok(())
        })
    }

    /// Remove every message from a queue, leased or not
    pub fn clear_messages(&self, name: &str) -> Result<usize, QueueError> {
        self.with_store(name, |store, _| {
            let cleared = store.clear();
            info!(queue = %store.queue(), count = cleared, "Cleared messages");
            Ok(cleared)
        })
    }

    /// Run `op` against a queue's store under its lock, after dropping expired messages
    fn with_store<T>(
        &self,
        name: &str,
        op: impl FnOnce(&mut MessageStore, DateTime<Utc>) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let name = normalize_queue_name(name)?;
        let queue = self.registry.get(&name)?;
        let mut store = queue.lock()?;
        let now = self.clock.now();
        store.purge_expired(now);
        op(&mut *store, now)
    }
}

impl Default for QueueService {
    fn default() -> Self {
        Self::new(QueueServiceConfig::default())
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
