//! Lease-based queue engine

mod lease;
mod message;
mod registry;
mod store;


pub use lease::{
    LeaseManager, LeasePolicy, DEFAULT_MAX_BATCH_SIZE, DEFAULT_VISIBILITY_TIMEOUT,
    MAX_VISIBILITY_TIMEOUT, MIN_VISIBILITY_TIMEOUT,
};
pub use message::{EnqueueOptions, QueueMessage, UpdatedReceipt};
pub use registry::{Queue, QueueRegistry};
pub use store::{MessageStore, DEFAULT_MAX_MESSAGE_BYTES};
