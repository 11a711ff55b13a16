// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The fixed outbound endpoint and the stream abstraction used to reach it.
//!
//! In production the destination is a Nitro Enclave addressed by its vsock
//! context id (CID) and port. Hosts without vsock (local development, CI) can
//! point the bridge at a TCP `host:port` instead; both speak the same framing.
//!
//! Outbound I/O is blocking because the `vsock` crate is synchronous, so every
//! method here is expected to run on the blocking pool.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use vsock::{VsockAddr, VsockStream};

use crate::constants::{VMADDR_CID_ANY, VMADDR_PORT_ANY};
use crate::errors::{AppError, ForwardError};

/// A connected, blocking byte stream to the destination.
///
/// Implemented for [`VsockStream`] and [`TcpStream`]; the framing codec only
/// depends on this trait so it can be exercised against in-memory streams.
pub trait Transport: Read + Write + Send {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
    /// Closes both halves of the stream.
    fn shutdown(&self) -> io::Result<()>;
}

impl Transport for VsockStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        VsockStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        VsockStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        VsockStream::shutdown(self, Shutdown::Both)
    }
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) -> io::Result<()> {
        TcpStream::shutdown(self, Shutdown::Both)
    }
}

/// Where every request is forwarded. Resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Vsock { cid: u32, port: u32 },
    Tcp { host: String, addrs: Vec<SocketAddr> },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vsock { cid, port } => write!(f, "vsock://{cid}:{port}"),
            Self::Tcp { host, .. } => write!(f, "tcp://{host}"),
        }
    }
}

impl Destination {
    /// Validates a vsock endpoint. The wildcard CID and port are rejected.
    pub fn vsock(cid: u32, port: u32) -> Result<Self, AppError> {
        if cid == VMADDR_CID_ANY {
            return Err(AppError::ConfigError(format!(
                "enclave CID {cid} is the wildcard address and cannot be connected to"
            )));
        }
        if port == VMADDR_PORT_ANY {
            return Err(AppError::ConfigError(format!(
                "enclave port {port} is the wildcard port and cannot be connected to"
            )));
        }
        Ok(Self::Vsock { cid, port })
    }

    /// Resolves a TCP `host:port` once so every request dials the same
    /// addresses.
    pub fn tcp(host: &str) -> Result<Self, AppError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(AppError::ConfigError(
                "TCP destination must not be empty".to_string(),
            ));
        }

        let addrs: Vec<SocketAddr> = host
            .to_socket_addrs()
            .map_err(|err| {
                AppError::ConfigError(format!("unable to resolve TCP destination {host}: {err}"))
            })?
            .collect();
        if addrs.is_empty() {
            return Err(AppError::ConfigError(format!(
                "TCP destination {host} resolved to no addresses"
            )));
        }

        Ok(Self::Tcp {
            host: host.to_string(),
            addrs,
        })
    }

    /// Opens a fresh connection to the destination.
    ///
    /// TCP connects are bounded by `timeout` per resolved address. vsock
    /// connects are bounded by the kernel's connect timeout and by the
    /// caller's overall bound on the forwarding task.
    ///
    /// # Errors
    ///
    /// - [`ForwardError::Timeout`] if the connect timed out
    /// - [`ForwardError::ConnectFailed`] for any other failure
    pub fn connect(&self, timeout: Duration) -> Result<Box<dyn Transport>, ForwardError> {
        match self {
            Self::Vsock { cid, port } => {
                let stream = VsockStream::connect(&VsockAddr::new(*cid, *port))
                    .map_err(|err| self.connect_error(err))?;
                Ok(Box::new(stream))
            }
            Self::Tcp { addrs, .. } => {
                let mut last_err = None;
                for addr in addrs {
                    match TcpStream::connect_timeout(addr, timeout) {
                        Ok(stream) => {
                            // replies are small and latency-bound
                            if let Err(err) = stream.set_nodelay(true) {
                                tracing::debug!("[bridge] failed to set TCP_NODELAY on {}: {}", addr, err);
                            }
                            return Ok(Box::new(stream));
                        }
                        Err(err) => {
                            tracing::debug!("[bridge] connect to {} failed: {}", addr, err);
                            last_err = Some(err);
                        }
                    }
                }
                let err = last_err.unwrap_or_else(|| {
                    io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to connect to")
                });
                Err(self.connect_error(err))
            }
        }
    }

    fn connect_error(&self, err: io::Error) -> ForwardError {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                ForwardError::Timeout(format!("connecting to {self}"))
            }
            _ => ForwardError::ConnectFailed(err.to_string()),
        }
    }
}
