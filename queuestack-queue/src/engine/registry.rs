//! Name to queue resolution and queue lifecycle

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

use super::store::MessageStore;
use crate::error::QueueError;

/// A queue: its message store plus descriptive state
#[derive(Debug)]
pub struct Queue {
    name: String,
    created_at: DateTime<Utc>,
    metadata: RwLock<HashMap<String, String>>,
    approximate_count: AtomicU64,
    deleted: AtomicBool,
    store: Mutex<MessageStore>,
}

impl Queue {
    fn new(
        name: String,
        metadata: HashMap<String, String>,
        max_message_bytes: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store: Mutex::new(MessageStore::new(name.clone(), max_message_bytes)),
            name,
            created_at: now,
            metadata: RwLock::new(metadata),
            approximate_count: AtomicU64::new(0),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn metadata(&self) -> HashMap<String, String> {
        self.metadata.read().clone()
    }

    /// Replace all metadata
    pub fn set_metadata(&self, metadata: HashMap<String, String>) {
        *self.metadata.write() = metadata;
    }

    /// Count as of the last refresh
    pub fn approximate_count(&self) -> u64 {
        self.approximate_count.load(Ordering::Relaxed)
    }

    /// Lock the message store, failing if the queue was deleted meanwhile
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, MessageStore>, QueueError> {
        let store = self.store.lock();
        if self.deleted.load(Ordering::Acquire) {
            return Err(QueueError::QueueNotFound {
                queue: self.name.clone(),
            });
        }
        Ok(store)
    }

    fn refresh_count(&self, now: DateTime<Utc>) -> Result<u64, QueueError> {
        let mut store = self.lock()?;
        store.purge_expired(now);
        let count = store.list_all().len() as u64;
        self.approximate_count.store(count, Ordering::Relaxed);
        Ok(count)
    }

    fn mark_deleted(&self) {
        let mut store = self.store.lock();
        self.deleted.store(true, Ordering::Release);
        store.clear();
        self.approximate_count.store(0, Ordering::Relaxed);
    }
}

/// All queues known to the service, keyed by normalized name
#[derive(Debug)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<Queue>>,
    strict_create: bool,
    max_message_bytes: usize,
}

impl QueueRegistry {
    pub fn new(strict_create: bool, max_message_bytes: usize) -> Self {
        Self {
            queues: DashMap::new(),
            strict_create,
            max_message_bytes,
        }
    }

    /// Create a queue, returning the existing one when already present
    ///
    /// With strict create enabled an existing queue is an error instead.
    pub fn create(
        &self,
        name: &str,
        metadata: HashMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<(Arc<Queue>, bool), QueueError> {
        match self.queues.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                if self.strict_create {
                    return Err(QueueError::QueueExists {
                        queue: name.to_string(),
                    });
                }
                Ok((existing.get().clone(), false))
            }
            Entry::Vacant(slot) => {
                let queue = Arc::new(Queue::new(
                    name.to_string(),
                    metadata,
                    self.max_message_bytes,
                    now,
                ));
                slot.insert(queue.clone());
                info!(queue = %name, "Created queue");
                Ok((queue, true))
            }
        }
    }

    /// Remove a queue and its messages; `false` if it did not exist
    pub fn delete(&self, name: &str) -> bool {
        match self.queues.remove(name) {
            Some((_, queue)) => {
                queue.mark_deleted();
                info!(queue = %name, "Deleted queue");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<Queue>, QueueError> {
        self.queues
            .get(name)
            .map(|q| q.value().clone())
            .ok_or_else(|| QueueError::QueueNotFound {
                queue: name.to_string(),
            })
    }

    /// Queues whose names start with `prefix`, in lexicographic order
    pub fn list(&self, prefix: Option<&str>) -> impl Iterator<Item = Arc<Queue>> {
        let mut queues: Vec<Arc<Queue>> = self
            .queues
            .iter()
            .filter(|q| prefix.map_or(true, |p| q.key().starts_with(p)))
            .map(|q| q.value().clone())
            .collect();
        queues.sort_by(|a, b| a.name.cmp(&b.name));
        queues.into_iter()
    }

    /// Recount messages (visible and leased) in a queue
    pub fn refresh_approximate_count(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        self.get(name)?.refresh_count(now)
    }
}
