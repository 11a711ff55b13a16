// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_ENCLAVE_CID, DEFAULT_ENCLAVE_PORT, DEFAULT_HTTP_HOST,
    DEFAULT_HTTP_PORT, DEFAULT_MAX_REPLY_BYTES, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_RECEIVE_TIMEOUT_MS, DEFAULT_SEND_TIMEOUT_MS,
};
use crate::destination::Destination;
use crate::errors::AppError;
use crate::models::JsonMode;
use crate::protocol::Framing;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, for log shipping
    #[default]
    Json,
    /// Human-readable output for local development
    Pretty,
}

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct BridgeOptions {
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env("BRIDGE_HTTP_HOST"))]
    pub host: String,
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env("BRIDGE_HTTP_PORT"))]
    pub port: u16,
    #[arg(long, default_value_t = DEFAULT_ENCLAVE_CID, env("BRIDGE_ENCLAVE_CID"))]
    pub enclave_cid: u32,
    #[arg(long, default_value_t = DEFAULT_ENCLAVE_PORT, env("BRIDGE_ENCLAVE_PORT"))]
    pub enclave_port: u32,
    /// Forward to a TCP host:port instead of vsock
    #[arg(long, env("BRIDGE_TCP_DESTINATION"))]
    pub tcp_destination: Option<String>,
    #[arg(long, value_enum, default_value_t = Framing::Newline, env("BRIDGE_FRAMING"))]
    pub framing: Framing,
    #[arg(long, value_enum, default_value_t = JsonMode::Passthrough, env("BRIDGE_JSON_MODE"))]
    pub json_mode: JsonMode,
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES, env("BRIDGE_MAX_REQUEST_BYTES"))]
    pub max_request_bytes: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_REPLY_BYTES, env("BRIDGE_MAX_REPLY_BYTES"))]
    pub max_reply_bytes: usize,
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_MS, env("BRIDGE_CONNECT_TIMEOUT_MS"))]
    pub connect_timeout_ms: u64,
    #[arg(long, default_value_t = DEFAULT_SEND_TIMEOUT_MS, env("BRIDGE_SEND_TIMEOUT_MS"))]
    pub send_timeout_ms: u64,
    #[arg(long, default_value_t = DEFAULT_RECEIVE_TIMEOUT_MS, env("BRIDGE_RECEIVE_TIMEOUT_MS"))]
    pub receive_timeout_ms: u64,
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env("BRIDGE_LOG_FORMAT"))]
    pub log_format: LogFormat,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        BridgeOptions {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            enclave_cid: DEFAULT_ENCLAVE_CID,
            enclave_port: DEFAULT_ENCLAVE_PORT,
            tcp_destination: None,
            framing: Framing::default(),
            json_mode: JsonMode::default(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_reply_bytes: DEFAULT_MAX_REPLY_BYTES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            send_timeout_ms: DEFAULT_SEND_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            log_format: LogFormat::default(),
        }
    }
}

/// Validated forwarding configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub destination: Destination,
    pub framing: Framing,
    pub json_mode: JsonMode,
    pub max_request_bytes: usize,
    pub max_reply_bytes: usize,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub receive_timeout: Duration,
}

fn non_zero_timeout(name: &str, millis: u64) -> Result<Duration, AppError> {
    if millis == 0 {
        return Err(AppError::ConfigError(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_millis(millis))
}

impl BridgeOptions {
    /// Validates the options and resolves the destination.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::ConfigError`] for zero limits or timeouts, a
    /// wildcard vsock address, or a TCP destination that does not resolve.
    pub fn to_config(&self) -> Result<BridgeConfig, AppError> {
        let destination = match &self.tcp_destination {
            Some(host) => Destination::tcp(host)?,
            None => Destination::vsock(self.enclave_cid, self.enclave_port)?,
        };

        if self.max_request_bytes == 0 {
            return Err(AppError::ConfigError(
                "max request bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_reply_bytes == 0 {
            return Err(AppError::ConfigError(
                "max reply bytes must be greater than zero".to_string(),
            ));
        }

        Ok(BridgeConfig {
            destination,
            framing: self.framing,
            json_mode: self.json_mode,
            max_request_bytes: self.max_request_bytes,
            max_reply_bytes: self.max_reply_bytes,
            connect_timeout: non_zero_timeout("connect timeout", self.connect_timeout_ms)?,
            send_timeout: non_zero_timeout("send timeout", self.send_timeout_ms)?,
            receive_timeout: non_zero_timeout("receive timeout", self.receive_timeout_ms)?,
        })
    }
}
