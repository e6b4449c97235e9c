//! HTTP response building helpers
//!
//! Every error body carries a stable `kind` so clients can tell a locked
//! record from a missing permission without parsing messages.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;
use tracing::error;

use crate::error::RecordsError;

fn response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    resp
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
    response(status, "application/json", Bytes::from(json))
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build an empty response with 204 No Content status
pub fn no_content() -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::new()));
    *resp.status_mut() = StatusCode::NO_CONTENT;
    resp
}

fn error_body(
    status: StatusCode,
    kind: &str,
    message: &str,
    retryable: bool,
) -> Response<Full<Bytes>> {
    json_response(
        status,
        &serde_json::json!({ "error": message, "kind": kind, "retryable": retryable }),
    )
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    error_body(StatusCode::NOT_FOUND, "not_found", message, false)
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed", "Method not allowed", false)
}

/// HTTP status for each error kind
pub fn status_for(error: &RecordsError) -> StatusCode {
    match error {
        RecordsError::NotFound(_) => StatusCode::NOT_FOUND,
        RecordsError::Forbidden(_) => StatusCode::FORBIDDEN,
        RecordsError::InvalidTransition(_) => StatusCode::CONFLICT,
        RecordsError::Locked(_) => StatusCode::LOCKED,
        RecordsError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RecordsError::Conflict(_) => StatusCode::CONFLICT,
        RecordsError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RecordsError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a RecordsError to an appropriate HTTP response
pub fn error_response(error: RecordsError) -> Response<Full<Bytes>> {
    let status = status_for(&error);
    if status.is_server_error() && !error.is_retryable() {
        error!(kind = error.kind(), error = %error, "Request failed");
    }
    error_body(status, error.kind(), &error.to_string(), error.is_retryable())
}

/// Build a binary response with the given content type
pub fn binary_response(content_type: &'static str, body: Vec<u8>) -> Response<Full<Bytes>> {
    response(StatusCode::OK, content_type, Bytes::from(body))
}

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, RecordsError>;

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, RecordsError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a create result into an HTTP response with 201 Created
pub fn from_create_result<T: Serialize>(result: Result<T, RecordsError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// Wrap a delete result into an HTTP response with 204 No Content
pub fn from_delete_result(result: Result<(), RecordsError>) -> Response<Full<Bytes>> {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}
