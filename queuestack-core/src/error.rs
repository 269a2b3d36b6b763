//! Service error types and formatting

use serde::Serialize;
use thiserror::Error;

use crate::request_id::RequestId;

/// Error codes surfaced by the queue service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Queue lifecycle
    QueueNotFound,
    QueueAlreadyExists,
    InvalidQueueName,

    // Messages
    RequestBodyTooLarge,
    PopReceiptMismatch,
    OutOfRangeQueryParameterValue,
    OutOfRangeInput,

    // Transport
    InvalidInput,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueNotFound => "QueueNotFound",
            Self::QueueAlreadyExists => "QueueAlreadyExists",
            Self::InvalidQueueName => "InvalidQueueName",
            Self::RequestBodyTooLarge => "RequestBodyTooLarge",
            Self::PopReceiptMismatch => "PopReceiptMismatch",
            Self::OutOfRangeQueryParameterValue => "OutOfRangeQueryParameterValue",
            Self::OutOfRangeInput => "OutOfRangeInput",
            Self::InvalidInput => "InvalidInput",
            Self::InternalError => "InternalError",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::QueueNotFound | Self::PopReceiptMismatch => 404,
            Self::QueueAlreadyExists => 409,
            Self::InvalidQueueName
            | Self::OutOfRangeQueryParameterValue
            | Self::OutOfRangeInput
            | Self::InvalidInput => 400,
            Self::RequestBodyTooLarge => 413,
            Self::InternalError => 500,
        }
    }
}

/// Transport-neutral error carrying a code, message and offending resource
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", code.as_str())]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub resource: Option<String>,
    pub request_id: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            resource: None,
            request_id: RequestId::new().to_string(),
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Format as a JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            code: &'static str,
            message: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            resource: Option<&'a str>,
            request_id: &'a str,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            resource: self.resource.as_deref(),
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}"}}"#,
                self.code.as_str(),
                self.message
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let error = ServiceError::new(ErrorCode::QueueNotFound, "The specified queue does not exist")
            .with_resource("orders01")
            .with_request_id("test-request-id");

        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["code"], "QueueNotFound");
        assert_eq!(json["resource"], "orders01");
        assert_eq!(json["requestId"], "test-request-id");
    }

    #[test]
    fn test_error_json_omits_missing_resource() {
        let error = ServiceError::new(ErrorCode::InvalidInput, "bad body");

        let json = error.to_json();
        assert!(json.contains("InvalidInput"));
        assert!(!json.contains("resource"));
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ErrorCode::QueueNotFound.http_status(), 404);
        assert_eq!(ErrorCode::PopReceiptMismatch.http_status(), 404);
        assert_eq!(ErrorCode::QueueAlreadyExists.http_status(), 409);
        assert_eq!(ErrorCode::RequestBodyTooLarge.http_status(), 413);
        assert_eq!(ErrorCode::OutOfRangeQueryParameterValue.http_status(), 400);
        assert_eq!(ErrorCode::OutOfRangeInput.http_status(), 400);
        assert_eq!(ErrorCode::InternalError.http_status(), 500);
    }

    #[test]
    fn test_default_request_id_matches_header_format() {
        let error = ServiceError::new(ErrorCode::InternalError, "boom");
        assert_eq!(error.request_id.len(), 32);
        assert!(error
            .request_id
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn test_display_includes_code() {
        let error = ServiceError::new(ErrorCode::QueueAlreadyExists, "exists");
        assert_eq!(error.to_string(), "QueueAlreadyExists: exists");
    }
}
