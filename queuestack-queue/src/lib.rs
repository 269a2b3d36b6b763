//! Lease-based message queues for queuestack
//!
//! Provides in-memory queues with at-least-once delivery:
//! - CreateQueue, DeleteQueue, ListQueues, queue metadata
//! - Enqueue, Peek, Retrieve (batch), UpdateMessage, DeleteMessage, Clear
//! - Visibility-timeout leases guarded by pop receipts

pub mod clock;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod names;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EnqueueOptions, QueueMessage, UpdatedReceipt};
pub use error::QueueError;
pub use handlers::{routes, stamp_request_id};
pub use names::{normalize_queue_name, NameGenerator};
pub use service::{CreatedQueue, QueueProperties, QueueService, QueueServiceConfig, QueueSummary};
