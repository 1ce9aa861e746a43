//! Request body size limit and JSON body scrubbing.
//!
//! Object keys that could be read as query operators (`$gt`, `a.b`) are
//! dropped and angle brackets in strings are HTML-escaped before any
//! handler sees the body.

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::header::{CONTENT_LENGTH, CONTENT_TYPE},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use crate::config;
use crate::error::ApiError;

const TOO_LARGE: &str = "Request body is too large";

pub async fn sanitize_body(request: Request, next: Next) -> Response {
    let limit = config::config().api.max_request_size_bytes;
    match limit_and_scrub(request, limit).await {
        Ok(request) => next.run(request).await,
        Err(err) => err.into_response(),
    }
}

async fn limit_and_scrub(request: Request, limit: usize) -> Result<Request, ApiError> {
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(ApiError::payload_too_large(TOO_LARGE));
    }

    let is_json = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));

    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::payload_too_large(TOO_LARGE))?;

    if !is_json || bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::from(bytes)));
    }

    // Malformed JSON passes through untouched for the extractor to reject
    let bytes = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => serde_json::to_vec(&sanitize(value))?.into(),
        Err(_) => bytes,
    };
    parts.headers.insert(CONTENT_LENGTH, bytes.len().into());
    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// Drop `$`-prefixed and dotted keys and escape `<` / `>` in strings, recursively
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| !key.starts_with('$') && !key.contains('.'))
                .map(|(key, value)| (key, sanitize(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::String(s) => Value::String(escape_html(&s)),
        other => other,
    }
}

fn escape_html(s: &str) -> String {
    s.replace('<', "&lt;").replace('>', "&gt;")
}
