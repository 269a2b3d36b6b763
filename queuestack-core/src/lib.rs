//! Core types shared across queuestack crates
//!
//! Holds the transport-neutral error model and request identifiers.

pub mod error;
pub mod request_id;

pub use error::{ErrorCode, ServiceError};
pub use request_id::{RequestId, REQUEST_ID_HEADER};
