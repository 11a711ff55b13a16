// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_ENCLAVE_CID: u32 = 16;
pub const DEFAULT_ENCLAVE_PORT: u32 = 5000;

/// `VMADDR_CID_ANY` and `VMADDR_PORT_ANY` are wildcards for binding, not
/// addresses that can be connected to.
pub const VMADDR_CID_ANY: u32 = u32::MAX;
pub const VMADDR_PORT_ANY: u32 = u32::MAX;

pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1 MB
pub const DEFAULT_MAX_REPLY_BYTES: usize = 10 * 1024 * 1024; // 10 MB

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 30_000;

/// Extra time granted to the blocking forwarding task on top of its own
/// connect/send/receive bounds before the async side gives up on it.
pub const FORWARD_TASK_GRACE: Duration = Duration::from_secs(1);

pub const FRAME_DELIMITER: u8 = b'\n';
pub const READ_CHUNK_SIZE: usize = 4096;
pub const LENGTH_HEADER_SIZE: usize = size_of::<u64>();

pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";
