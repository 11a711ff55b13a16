// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP route handlers for the bridge.
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | `/health` | [`health`] | Health check endpoint |
//! | POST | any path | [`forward`] | Forward the body to the destination |
//!
//! Other methods on any path are answered with 405 Method Not Allowed.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};

use crate::application::AppState;
use crate::errors::{AppError, ForwardError};
use crate::models::{HealthResponse, prepare_payload};

/// Health check endpoint.
///
/// # Response
///
/// ```json
/// {"status": "ok", "destination": "vsock://16:5000", "open_connections": 0}
/// ```
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        destination: state.forwarder.config().destination.to_string(),
        open_connections: state.forwarder.open_connections(),
    })
}

/// Reads the mandatory `Content-Length` header.
///
/// # Errors
///
/// - [`ForwardError::MalformedInput`] if the header is missing or not a number
/// - [`ForwardError::RequestTooLarge`] if it exceeds `max_request_bytes`
pub fn content_length(headers: &HeaderMap, max_request_bytes: usize) -> Result<usize, ForwardError> {
    let value = headers
        .get(header::CONTENT_LENGTH)
        .ok_or_else(|| ForwardError::MalformedInput("missing Content-Length header".to_string()))?;

    let length: u64 = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| ForwardError::MalformedInput("invalid Content-Length header".to_string()))?;

    if length > max_request_bytes as u64 {
        return Err(ForwardError::RequestTooLarge {
            size: length,
            max: max_request_bytes,
        });
    }

    // bounded by max_request_bytes above
    Ok(length as usize)
}

/// Forwards the request body to the destination and relays its reply.
///
/// # Request Flow
///
/// 1. Require a `Content-Length` within the configured maximum
/// 2. Read exactly that many bytes
/// 3. Apply the configured JSON mode
/// 4. Forward over a fresh outbound connection (blocking pool)
/// 5. Return the stripped reply as `application/json`, which is empty when
///    the destination hangs up without answering
///
/// # Errors
///
/// Every failure is an HTTP 500 with `{"error": "<message>"}`, see
/// [`AppError`].
#[tracing::instrument(skip(state, headers, body))]
pub async fn forward(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let config = state.forwarder.config();

    let length = content_length(&headers, config.max_request_bytes).map_err(|e| {
        tracing::error!("[bridge] rejected request: {}", e);
        e
    })?;

    let body = axum::body::to_bytes(body, length).await.map_err(|e| {
        tracing::error!("[bridge] failed to read request body: {:?}", e);
        ForwardError::MalformedInput(format!(
            "request body does not match Content-Length of {length} bytes"
        ))
    })?;
    if body.len() != length {
        return Err(ForwardError::MalformedInput(format!(
            "request body of {} bytes does not match Content-Length of {length} bytes",
            body.len()
        ))
        .into());
    }

    let payload = prepare_payload(body, config.json_mode, config.framing).map_err(|e| {
        tracing::error!("[bridge] rejected request: {}", e);
        e
    })?;

    tracing::debug!(
        "[bridge] forwarding {} bytes for {} to {}",
        payload.len(),
        uri.path(),
        config.destination
    );

    let reply = Arc::clone(&state.forwarder)
        .forward_async(payload)
        .await
        .map_err(|e| {
            tracing::error!("[bridge] forwarding failed: {}", e);
            e
        })?;

    Ok((
        [(header::CONTENT_TYPE, "application/json")],
        Body::from(reply),
    )
        .into_response())
}
