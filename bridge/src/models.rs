// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::body::Bytes;
use clap::ValueEnum;
use serde::de::IgnoredAny;
use serde::Serialize;
use serde_json::Value;

use crate::constants::FRAME_DELIMITER;
use crate::errors::ForwardError;
use crate::protocol::Framing;

/// How the request body is treated before it is forwarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum JsonMode {
    /// Forward the body byte-for-byte
    #[default]
    Passthrough,
    /// Reject bodies that are not well-formed JSON
    Validate,
    /// Re-serialize the body as single-line JSON
    Compact,
}

/// Body of every failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub destination: String,
    pub open_connections: usize,
}

fn is_json(body: &[u8]) -> Result<(), serde_json::Error> {
    serde_json::from_slice::<IgnoredAny>(body).map(|_| ())
}

/// Applies `mode` to a request body and returns the bytes to forward.
///
/// # Errors
///
/// Returns [`ForwardError::MalformedInput`] when `mode` requires JSON and the
/// body is not well-formed.
pub fn prepare_payload(
    body: Bytes,
    mode: JsonMode,
    framing: Framing,
) -> Result<Bytes, ForwardError> {
    let payload = match mode {
        JsonMode::Passthrough => {
            if let Err(err) = is_json(&body) {
                tracing::debug!("[bridge] forwarding body that is not JSON: {}", err);
            }
            body
        }
        JsonMode::Validate => {
            is_json(&body)
                .map_err(|err| ForwardError::MalformedInput(format!("invalid JSON: {err}")))?;
            body
        }
        JsonMode::Compact => {
            let value: Value = serde_json::from_slice(&body)
                .map_err(|err| ForwardError::MalformedInput(format!("invalid JSON: {err}")))?;
            let compact = serde_json::to_vec(&value)
                .map_err(|err| ForwardError::MalformedInput(format!("invalid JSON: {err}")))?;
            Bytes::from(compact)
        }
    };

    if framing == Framing::Newline && payload.contains(&FRAME_DELIMITER) {
        tracing::warn!(
            "[bridge] request body contains the frame delimiter, the destination may see a truncated message"
        );
    }

    Ok(payload)
}
