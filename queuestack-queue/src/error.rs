//! Queue engine errors

use queuestack_core::{ErrorCode, ServiceError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue does not exist: {queue}")]
    QueueNotFound { queue: String },

    #[error("Queue already exists: {queue}")]
    QueueExists { queue: String },

    #[error("Invalid queue name '{queue}': {reason}")]
    InvalidQueueName { queue: String, reason: String },

    #[error("Message body of {size} bytes exceeds the {limit} byte limit")]
    InvalidPayload { size: usize, limit: usize },

    #[error(
        "Time-to-live of {}s must be greater than the initial delay of {}s",
        time_to_live.as_secs(),
        initial_delay.as_secs()
    )]
    InvalidTimeToLive {
        time_to_live: Duration,
        initial_delay: Duration,
    },

    #[error("Pop receipt for message {message_id} in queue {queue} is invalid or expired")]
    ReceiptExpired { queue: String, message_id: String },

    #[error("Requested {requested} messages, allowed range is 1..={limit}")]
    BatchLimitExceeded { requested: usize, limit: usize },
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QueueNotFound { .. } => ErrorCode::QueueNotFound,
            Self::QueueExists { .. } => ErrorCode::QueueAlreadyExists,
            Self::InvalidQueueName { .. } => ErrorCode::InvalidQueueName,
            Self::InvalidPayload { .. } => ErrorCode::RequestBodyTooLarge,
            Self::InvalidTimeToLive { .. } => ErrorCode::OutOfRangeInput,
            Self::ReceiptExpired { .. } => ErrorCode::PopReceiptMismatch,
            Self::BatchLimitExceeded { .. } => ErrorCode::OutOfRangeQueryParameterValue,
        }
    }

    /// The queue or message the error refers to, if any
    pub fn resource(&self) -> Option<String> {
        match self {
            Self::QueueNotFound { queue }
            | Self::QueueExists { queue }
            | Self::InvalidQueueName { queue, .. } => Some(queue.clone()),
            Self::ReceiptExpired { queue, message_id } => Some(format!("{queue}/{message_id}")),
            Self::InvalidPayload { .. }
            | Self::InvalidTimeToLive { .. }
            | Self::BatchLimitExceeded { .. } => None,
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        let service_error = ServiceError::new(err.code(), err.to_string());
        match err.resource() {
            Some(resource) => service_error.with_resource(resource),
            None => service_error,
        }
    }
}
