// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Shared utilities for integration tests.
//!
//! The mock destination is a plain TCP listener speaking the bridge's framing,
//! standing in for the enclave. It counts accepted connections and
//! connections the bridge has closed, so tests can assert that no outbound
//! connection outlives a forwarding call.

#![allow(clippy::unwrap_used, dead_code)]

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use byteorder::{ByteOrder, LittleEndian};
use vsock_bridge::configuration::{BridgeConfig, BridgeOptions};
use vsock_bridge::protocol::Framing;

type Handler = dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync;

pub struct MockDestination {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockDestination {
    /// Starts a destination that answers each request with whatever
    /// `handler` returns, written verbatim. `None` means never reply.
    pub fn start<F>(framing: Framing, handler: F) -> Self
    where
        F: Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);

        {
            let accepted = Arc::clone(&accepted);
            let closed = Arc::clone(&closed);
            let requests = Arc::clone(&requests);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let closed = Arc::clone(&closed);
                    let requests = Arc::clone(&requests);
                    let handler = Arc::clone(&handler);
                    thread::spawn(move || {
                        serve_connection(stream, framing, &*handler, &requests);
                        closed.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });
        }

        Self {
            addr,
            accepted,
            closed,
            requests,
        }
    }

    /// A destination that always answers with `reply` plus a newline.
    pub fn replying(reply: &'static str) -> Self {
        Self::start(Framing::Newline, move |_| Some(format!("{reply}\n").into_bytes()))
    }

    /// A destination that echoes the request back as a newline-framed reply.
    pub fn echo() -> Self {
        Self::start(Framing::Newline, |request| {
            let mut reply = request.to_vec();
            reply.push(b'\n');
            Some(reply)
        })
    }

    /// A destination that accepts connections and reads requests but never
    /// replies.
    pub fn silent() -> Self {
        Self::start(Framing::Newline, |_| None)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }

    /// Waits until every accepted connection has been closed by the bridge.
    pub fn wait_all_closed(&self) -> bool {
        wait_for(Duration::from_secs(5), || self.closed() == self.accepted())
    }
}

fn serve_connection(
    stream: TcpStream,
    framing: Framing,
    handler: &Handler,
    requests: &Mutex<Vec<Vec<u8>>>,
) {
    let mut writer = match stream.try_clone() {
        Ok(writer) => writer,
        Err(_) => return,
    };
    let mut reader = BufReader::new(stream);

    let request = match framing {
        Framing::Newline => {
            let mut request = Vec::new();
            if reader.read_until(b'\n', &mut request).is_err() {
                return;
            }
            if request.last() == Some(&b'\n') {
                request.pop();
            }
            request
        }
        Framing::LengthPrefixed => {
            let mut header = [0u8; 8];
            if reader.read_exact(&mut header).is_err() {
                return;
            }
            let mut request = vec![0u8; LittleEndian::read_u64(&header) as usize];
            if reader.read_exact(&mut request).is_err() {
                return;
            }
            request
        }
    };

    requests.lock().unwrap().push(request.clone());

    if let Some(reply) = handler(&request) {
        // the bridge may hang up early, e.g. on an oversized reply
        let _ = writer.write_all(&reply);
        let _ = writer.flush();
    }

    // hold the connection open until the bridge closes its end
    let _ = io::copy(&mut reader, &mut io::sink());
}

/// Frames `payload` with an 8-byte little-endian length header.
pub fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut header = [0u8; 8];
    LittleEndian::write_u64(&mut header, payload.len() as u64);
    [&header[..], payload].concat()
}

/// A localhost port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

pub fn wait_for(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Options pointing at a TCP destination with short test timeouts.
pub fn options_for(addr: SocketAddr) -> BridgeOptions {
    BridgeOptions {
        tcp_destination: Some(addr.to_string()),
        connect_timeout_ms: 1_000,
        send_timeout_ms: 1_000,
        receive_timeout_ms: 1_000,
        ..Default::default()
    }
}

pub fn config_for(addr: SocketAddr) -> BridgeConfig {
    options_for(addr).to_config().unwrap()
}
