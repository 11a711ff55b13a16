// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # vsock Bridge
//!
//! An HTTP front end for a service inside a Nitro Enclave.
//!
//! Every HTTP POST body is forwarded over a fresh vsock connection to a fixed
//! enclave endpoint, and the enclave's single-line reply is returned as the
//! HTTP response body.
//!
//! ## Architecture
//!
//! ```text
//! Client -> HTTP API -> Bridge (this crate) -> vsock -> Enclave
//! ```
//!
//! - **HTTP API**: Axum-based server; `POST` on any path forwards, `GET /health`
//!   reports status
//! - **Forwarding**: one outbound connection per request, released on every
//!   exit path, with connect/send/receive timeouts and size limits
//! - **Framing**: newline-delimited by default, length-prefixed optionally
//! - **Destinations**: vsock `(cid, port)`, or TCP `host:port` where vsock is
//!   unavailable
//!
//! ## Modules
//!
//! - [`application`]: HTTP server setup with Axum and graceful shutdown
//! - [`configuration`]: CLI argument parsing with clap
//! - [`constants`]: Defaults and protocol constants
//! - [`destination`]: Destination endpoints and the transport abstraction
//! - [`errors`]: Forwarding error taxonomy with HTTP response mapping
//! - [`forwarder`]: The forwarding operation and connection lifecycle
//! - [`models`]: Payload preparation and response bodies
//! - [`protocol`]: Message framing and deadlines
//! - [`routes`]: HTTP route handlers (health, forward)
//!
//! ## Usage
//!
//! ```bash
//! vsock-bridge --port 8000 --enclave-cid 16 --enclave-port 5000
//! ```
//!
//! Every request failure is answered with HTTP 500 and
//! `{"error": "<message>"}`; the process itself only exits on invalid
//! configuration or when the listen port cannot be bound.

pub mod application;
pub mod configuration;
pub mod constants;
pub mod destination;
pub mod errors;
pub mod forwarder;
pub mod models;
pub mod protocol;
pub mod routes;
