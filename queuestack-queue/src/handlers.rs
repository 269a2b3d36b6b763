//! HTTP handlers for the queue service

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use queuestack_core::{ErrorCode, RequestId, ServiceError, REQUEST_ID_HEADER};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::engine::{EnqueueOptions, QueueMessage};
use crate::error::QueueError;
use crate::service::QueueService;

/// Routes for queue and message operations
pub fn routes(service: Arc<QueueService>) -> Router {
    Router::new()
        .route("/queues", get(list_queues))
        .route(
            "/queues/:name",
            post(create_queue).delete(delete_queue).get(get_properties),
        )
        .route("/queues/:name/metadata", get(get_metadata).put(set_metadata))
        .route(
            "/queues/:name/messages",
            post(enqueue).get(get_messages).delete(clear_messages),
        )
        .route(
            "/queues/:name/messages/:id",
            put(update_message).delete(delete_message),
        )
        .with_state(service)
}

/// Tag every response with one request ID
///
/// A non-empty `x-request-id` sent by the client is echoed back; otherwise a
/// fresh ID is generated. Error bodies are re-rendered so their `requestId`
/// matches the header.
pub async fn stamp_request_id(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(RequestId::with_id)
        .unwrap_or_default();

    let mut response = next.run(request).await;
    if let Some(error) = response.extensions_mut().remove::<ServiceError>() {
        response = ApiError(error.with_request_id(request_id.as_str())).into_response();
        response.extensions_mut().remove::<ServiceError>();
    }
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

// === Wire types ===

#[derive(Debug, Deserialize, Default)]
pub struct ListQueuesQuery {
    pub prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MessagesQuery {
    pub peekonly: Option<bool>,
    pub numofmessages: Option<usize>,
    pub visibilitytimeout: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ReceiptQuery {
    pub popreceipt: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct MetadataBody {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct EnqueueBody {
    content: String,
    visibility_delay: Option<u64>,
    time_to_live: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    content: Option<String>,
    visibility_timeout: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageView {
    message_id: String,
    content: String,
    insertion_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_time: Option<DateTime<Utc>>,
    time_next_visible: DateTime<Utc>,
    dequeue_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pop_receipt: Option<String>,
}

impl From<QueueMessage> for MessageView {
    fn from(message: QueueMessage) -> Self {
        Self {
            content: message.body_text(),
            message_id: message.id,
            insertion_time: message.enqueued_at,
            expiration_time: message.expires_at,
            time_next_visible: message.visible_at,
            dequeue_count: message.dequeue_count,
            pop_receipt: message.pop_receipt,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueSummaryView {
    name: String,
    approximate_message_count: u64,
}

// === Errors ===

/// Error rendered as a JSON body with the mapped HTTP status
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err.into())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        invalid_input(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        debug!(code = self.0.code.as_str(), message = %self.0.message, "Request failed");

        let mut response = json_response(status, self.0.to_json());
        if let Ok(value) = HeaderValue::from_str(&self.0.request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response.extensions_mut().insert(self.0);
        response
    }
}

fn invalid_input(message: impl Into<String>) -> ApiError {
    ApiError(ServiceError::new(ErrorCode::InvalidInput, message))
}

type ApiResult = Result<Response, ApiError>;

// === Queue handlers ===

async fn list_queues(
    State(service): State<Arc<QueueService>>,
    query: Result<Query<ListQueuesQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let queues: Vec<QueueSummaryView> = service
        .list_queues(query.prefix.as_deref())
        .into_iter()
        .map(|q| QueueSummaryView {
            name: q.name,
            approximate_message_count: q.approximate_count,
        })
        .collect();

    let queues = to_value(&queues)?;
    Ok(json_ok(&serde_json::json!({ "queues": queues })))
}

async fn create_queue(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body: MetadataBody = parse_json_or_default(&body)?;
    let outcome = service.create_queue(&name, body.metadata)?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok(json_response(
        status,
        serde_json::json!({ "name": outcome.name, "created": outcome.created }).to_string(),
    ))
}

async fn delete_queue(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
) -> ApiResult {
    service.delete_queue(&name)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn get_properties(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
) -> ApiResult {
    let props = service.get_properties(&name)?;
    Ok(json_ok(&serde_json::json!({
        "name": props.name,
        "createdAt": props.created_at,
        "metadata": props.metadata,
        "approximateMessageCount": props.approximate_count,
    })))
}

async fn get_metadata(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
) -> ApiResult {
    let metadata = service.get_metadata(&name)?;
    Ok(json_ok(&serde_json::json!({ "metadata": metadata })))
}

async fn set_metadata(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body: MetadataBody = parse_json(&body)?;
    service.set_metadata(&name, body.metadata)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// === Message handlers ===

async fn enqueue(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
    body: Bytes,
) -> ApiResult {
    let body: EnqueueBody = parse_json(&body)?;
    let options = EnqueueOptions {
        initial_delay: Duration::from_secs(body.visibility_delay.unwrap_or(0)),
        time_to_live: body.time_to_live.map(Duration::from_secs),
    };

    let message = service.enqueue(&name, Bytes::from(body.content), options)?;
    let view = to_value(&MessageView::from(message))?;
    Ok(json_response(StatusCode::CREATED, view.to_string()))
}

async fn get_messages(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let max_count = query.numofmessages.unwrap_or(1);

    let messages = if query.peekonly.unwrap_or(false) {
        service.peek(&name, max_count)?
    } else {
        service.retrieve(
            &name,
            max_count,
            query.visibilitytimeout.map(Duration::from_secs),
        )?
    };

    let messages: Vec<MessageView> = messages.into_iter().map(MessageView::from).collect();
    let messages = to_value(&messages)?;
    Ok(json_ok(&serde_json::json!({ "messages": messages })))
}

async fn clear_messages(
    State(service): State<Arc<QueueService>>,
    Path(name): Path<String>,
) -> ApiResult {
    service.clear_messages(&name)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn update_message(
    State(service): State<Arc<QueueService>>,
    Path((name, id)): Path<(String, String)>,
    query: Result<Query<ReceiptQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult {
    let receipt = required_receipt(query?)?;
    let body: UpdateBody = parse_json(&body)?;

    let updated = service.update_message(
        &name,
        &id,
        &receipt,
        body.content.map(Bytes::from),
        Duration::from_secs(body.visibility_timeout),
    )?;

    Ok(json_ok(&serde_json::json!({
        "popReceipt": updated.pop_receipt,
        "timeNextVisible": updated.visible_at,
    })))
}

async fn delete_message(
    State(service): State<Arc<QueueService>>,
    Path((name, id)): Path<(String, String)>,
    query: Result<Query<ReceiptQuery>, QueryRejection>,
) -> ApiResult {
    let receipt = required_receipt(query?)?;
    service.delete_message(&name, &id, &receipt)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// === Helpers ===

fn required_receipt(Query(query): Query<ReceiptQuery>) -> Result<String, ApiError> {
    query
        .popreceipt
        .filter(|r| !r.is_empty())
        .ok_or_else(|| invalid_input("popreceipt is required"))
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| invalid_input(format!("Malformed request body: {e}")))
}

fn parse_json_or_default<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value).map_err(|e| {
        ApiError(ServiceError::new(
            ErrorCode::InternalError,
            format!("Failed to encode response: {e}"),
        ))
    })
}

fn json_ok(value: &serde_json::Value) -> Response {
    json_response(StatusCode::OK, value.to_string())
}

fn json_response(status: StatusCode, body: String) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        routes(Arc::new(QueueService::default()))
            .layer(axum::middleware::from_fn(stamp_request_id))
    }

    async fn call(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_create_queue_status_codes() {
        let app = app();

        let (status, body) = call(&app, "POST", "/queues/orders01", "").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["created"], true);

        let (status, body) = call(&app, "POST", "/queues/orders01", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], false);
    }

    #[tokio::test]
    async fn test_invalid_queue_name() {
        let app = app();
        let (status, body) = call(&app, "POST", "/queues/a_b", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidQueueName");
    }

    #[tokio::test]
    async fn test_missing_queue_is_404() {
        let app = app();
        let (status, body) = call(&app, "GET", "/queues/nosuchqueue/messages", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "QueueNotFound");
        assert_eq!(body["resource"], "nosuchqueue");
    }

    #[tokio::test]
    async fn test_delete_queue_always_204() {
        let app = app();
        let (status, _) = call(&app, "DELETE", "/queues/orders01", "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_peek_retrieve_delete_flow() {
        let app = app();
        call(&app, "POST", "/queues/orders01", "").await;
        let (status, sent) = call(
            &app,
            "POST",
            "/queues/orders01/messages",
            r#"{"content":"Hello!"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(sent.get("popReceipt").is_none());

        let (_, peeked) = call(&app, "GET", "/queues/orders01/messages?peekonly=true", "").await;
        assert_eq!(peeked["messages"][0]["content"], "Hello!");
        assert!(peeked["messages"][0].get("popReceipt").is_none());

        let (_, got) = call(
            &app,
            "GET",
            "/queues/orders01/messages?numofmessages=1&visibilitytimeout=30",
            "",
        )
        .await;
        let message = &got["messages"][0];
        assert_eq!(message["dequeueCount"], 1);
        let id = message["messageId"].as_str().unwrap();
        let receipt = message["popReceipt"].as_str().unwrap();

        let uri = format!("/queues/orders01/messages/{id}?popreceipt={receipt}");
        let (status, _) = call(&app, "DELETE", &uri, "").await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, "DELETE", &uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "PopReceiptMismatch");
    }

    #[tokio::test]
    async fn test_batch_cap_is_400() {
        let app = app();
        call(&app, "POST", "/queues/batch01", "").await;
        let (status, body) =
            call(&app, "GET", "/queues/batch01/messages?numofmessages=40", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "OutOfRangeQueryParameterValue");
    }

    #[tokio::test]
    async fn test_malformed_input() {
        let app = app();
        call(&app, "POST", "/queues/orders01", "").await;

        let (status, body) = call(&app, "POST", "/queues/orders01/messages", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidInput");

        let (status, body) = call(
            &app,
            "GET",
            "/queues/orders01/messages?numofmessages=lots",
            "",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "InvalidInput");

        let (status, _) = call(
            &app,
            "PUT",
            "/queues/orders01/messages/some-id",
            r#"{"visibilityTimeout":0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_time_to_live_within_delay_is_400() {
        let app = app();
        call(&app, "POST", "/queues/orders01", "").await;

        let (status, body) = call(
            &app,
            "POST",
            "/queues/orders01/messages",
            r#"{"content":"late","visibilityDelay":120,"timeToLive":60}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "OutOfRangeInput");

        let (status, _) = call(
            &app,
            "POST",
            "/queues/orders01/messages",
            r#"{"content":"gone","timeToLive":0}"#,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, props) = call(&app, "GET", "/queues/orders01", "").await;
        assert_eq!(props["approximateMessageCount"], 0);
    }

    #[tokio::test]
    async fn test_error_request_id_matches_header() {
        let app = app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/queues/nosuchqueue")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let header = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(body["requestId"], header.as_str());
        assert_eq!(header.len(), 32);
        assert!(header.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[tokio::test]
    async fn test_client_request_id_is_echoed() {
        let app = app();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/queues/nosuchqueue/messages")
                    .header(REQUEST_ID_HEADER, "client-trace-7")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "client-trace-7");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["requestId"], "client-trace-7");

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/queues/orders01")
                    .header(REQUEST_ID_HEADER, "client-trace-8")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[REQUEST_ID_HEADER], "client-trace-8");
    }

    #[tokio::test]
    async fn test_metadata_endpoints() {
        let app = app();
        call(
            &app,
            "POST",
            "/queues/queuemeta",
            r#"{"metadata":{"key1":"value1","foo":"bar"}}"#,
        )
        .await;

        let (_, body) = call(&app, "GET", "/queues/queuemeta/metadata", "").await;
        assert_eq!(body["metadata"]["foo"], "bar");

        let (status, _) = call(
            &app,
            "PUT",
            "/queues/queuemeta/metadata",
            r#"{"metadata":{"only":"this"}}"#,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, props) = call(&app, "GET", "/queues/queuemeta", "").await;
        assert_eq!(props["metadata"], serde_json::json!({"only": "this"}));
        assert_eq!(props["approximateMessageCount"], 0);
    }

    #[tokio::test]
    async fn test_list_queues() {
        let app = app();
        for name in ["queuebasics-b", "queuebasics-a", "other"] {
            call(&app, "POST", &format!("/queues/{name}"), "").await;
        }

        let (_, body) = call(&app, "GET", "/queues?prefix=queuebasics-", "").await;
        let names: Vec<&str> = body["queues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|q| q["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["queuebasics-a", "queuebasics-b"]);
    }
}
