use std::time::Instant;

use axum::body::{Body, Bytes, HttpBody};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Bodies up to this size are logged when they are JSON.
const MAX_LOGGED_BODY: u64 = 1024;

/// Object keys whose values never reach the log, at any depth.
const SECRET_FIELDS: &[&str] = &["password", "confirmPassword", "confirm_password", "token"];

/// Wrap each request in an `http_request` span carrying a trace id, log
/// small JSON bodies, and echo the trace id on the response.
///
/// Only bodies with a known length are buffered; streamed responses pass
/// through untouched.
pub async fn trace_middleware(req: Request, next: Next) -> Response {
    let start_time = Instant::now();

    let trace_id = req
        .headers()
        .get(X_TRACE_ID)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4);

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        info!("→ request started");
        let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

        let (parts, body) = req.into_parts();
        let body = log_small_json("request", &parts.headers, body).await;
        let mut req = Request::from_parts(parts, body);
        if let Some(value) = &trace_header {
            req.headers_mut().insert(X_TRACE_ID, value.clone());
        }

        let response = next.run(req).await;

        let (parts, body) = response.into_parts();
        let body = log_small_json("response", &parts.headers, body).await;
        let mut response = Response::from_parts(parts, body);
        if let Some(value) = trace_header {
            response.headers_mut().insert(X_TRACE_ID, value);
        }

        info!(
            status = response.status().as_u16(),
            latency_ms = start_time.elapsed().as_millis(),
            "← response finished"
        );
        response
    }
    .instrument(span)
    .await
}

/// Buffer and log `body` when it is JSON of a small known size; otherwise
/// hand it back unread. Secret fields are masked in the logged copy only.
async fn log_small_json(direction: &str, headers: &HeaderMap, body: Body) -> Body {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let small = body.size_hint().exact().is_some_and(|n| n <= MAX_LOGGED_BODY);
    if !content_type.contains("application/json") || !small {
        return body;
    }

    let bytes = match axum::body::to_bytes(body, MAX_LOGGED_BODY as usize).await {
        Ok(bytes) => bytes,
        Err(_) => return Body::from(Bytes::new()),
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            redact(&mut value);
            info!("{direction} body: {value}");
        }
        Err(_) => info!("{direction} body: <{} bytes, not valid JSON>", bytes.len()),
    }
    Body::from(bytes)
}

fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if SECRET_FIELDS.contains(&key.as_str()) {
                    *field = Value::String("[redacted]".into());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}
