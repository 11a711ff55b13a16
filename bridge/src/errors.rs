// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::models::ErrorBody;

/// Failure of a single forwarding operation.
///
/// Every variant renders with a distinct prefix so callers can tell the
/// failure classes apart from the error message alone.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ForwardError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
    #[error("reply too large: {size} bytes exceeds maximum of {max} bytes")]
    ReplyTooLarge { size: u64, max: usize },
    #[error("timed out {0}")]
    Timeout(String),
    #[error("malformed input: {0}")]
    MalformedInput(String),
    #[error("request too large: {size} bytes exceeds maximum of {max} bytes")]
    RequestTooLarge { size: u64, max: usize },
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AppError {
    #[error(transparent)]
    Forward(#[from] ForwardError),
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // a single request failing never leaks more than a message
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        let body = Json(ErrorBody {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
