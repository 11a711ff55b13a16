// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Request forwarding to the destination.
//!
//! Every call to [`Forwarder::forward`] runs the same linear pipeline:
//!
//! 1. Open a fresh connection to the configured [`Destination`]
//! 2. Send the payload as one frame
//! 3. Read one framed reply, bounded in size and time
//! 4. Release the connection, whatever the outcome
//!
//! Calls share nothing but the read-only [`BridgeConfig`] and a counter of
//! open connections, so any number of them may run concurrently.
//!
//! [`Destination`]: crate::destination::Destination

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;

use crate::configuration::BridgeConfig;
use crate::constants::FORWARD_TASK_GRACE;
use crate::destination::Transport;
use crate::errors::ForwardError;
use crate::protocol::{Deadline, recv_frame, send_frame};

/// An outbound connection owned by exactly one forwarding operation.
///
/// The stream is shut down and the open-connection count decremented when
/// the guard is dropped, on success, error and unwinding alike.
struct Connection {
    stream: Box<dyn Transport>,
    open_connections: Arc<AtomicUsize>,
}

impl Connection {
    fn new(stream: Box<dyn Transport>, open_connections: Arc<AtomicUsize>) -> Self {
        open_connections.fetch_add(1, Ordering::SeqCst);
        Self {
            stream,
            open_connections,
        }
    }

    fn stream(&mut self) -> &mut dyn Transport {
        self.stream.as_mut()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Err(err) = self.stream.shutdown() {
            // already closed by the peer
            tracing::trace!("[bridge] shutdown of outbound connection failed: {}", err);
        }
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct Forwarder {
    config: BridgeConfig,
    open_connections: Arc<AtomicUsize>,
}

impl Forwarder {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            open_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Number of outbound connections currently held by in-flight calls.
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Upper bound on one blocking [`forward`](Self::forward) call.
    pub fn task_timeout(&self) -> Duration {
        self.config.connect_timeout
            + self.config.send_timeout
            + self.config.receive_timeout
            + FORWARD_TASK_GRACE
    }

    /// Forwards one payload and returns the destination's reply.
    ///
    /// This method is blocking and should be called via
    /// [`forward_async`](Self::forward_async) or
    /// `tokio::task::spawn_blocking` from async context.
    ///
    /// # Errors
    ///
    /// - [`ForwardError::ConnectFailed`] - the destination could not be reached
    /// - [`ForwardError::SendFailed`] - writing the request failed
    /// - [`ForwardError::ReceiveFailed`] - reading the reply failed
    /// - [`ForwardError::ReplyTooLarge`] - the reply exceeded the configured maximum
    /// - [`ForwardError::Timeout`] - a connect, send or receive bound was exceeded
    #[tracing::instrument(skip(self, payload), fields(destination = %self.config.destination, bytes = payload.len()))]
    pub fn forward(&self, payload: &[u8]) -> Result<Vec<u8>, ForwardError> {
        let stream = self
            .config
            .destination
            .connect(self.config.connect_timeout)?;
        let mut connection = Connection::new(stream, Arc::clone(&self.open_connections));

        tracing::debug!("[bridge] connected to {}", self.config.destination);

        let deadline = Deadline::after(self.config.send_timeout, "sending request");
        send_frame(connection.stream(), payload, self.config.framing, &deadline)?;

        let deadline = Deadline::after(self.config.receive_timeout, "waiting for reply");
        let reply = recv_frame(
            connection.stream(),
            self.config.framing,
            self.config.max_reply_bytes,
            &deadline,
        )?;

        tracing::debug!(
            "[bridge] received reply ({} bytes) from {}",
            reply.len(),
            self.config.destination
        );

        Ok(reply)
    }

    /// Runs [`forward`](Self::forward) on the blocking pool.
    ///
    /// The blocking task is bounded by [`task_timeout`](Self::task_timeout).
    /// If that bound is hit, or the caller goes away, the task still runs to
    /// completion in the background and releases its connection on its own.
    ///
    /// # Errors
    ///
    /// Everything [`forward`](Self::forward) returns, plus
    /// [`ForwardError::Timeout`] when the task overruns its bound and
    /// [`ForwardError::Internal`] when it cannot be joined.
    pub async fn forward_async(self: Arc<Self>, payload: Bytes) -> Result<Vec<u8>, ForwardError> {
        let bound = self.task_timeout();
        let forwarder = Arc::clone(&self);
        let task = tokio::task::spawn_blocking(move || forwarder.forward(&payload));

        match tokio::time::timeout(bound, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                tracing::error!("[bridge] spawn_blocking task failed: {:?}", err);
                Err(ForwardError::Internal(
                    "forwarding task did not complete".to_string(),
                ))
            }
            Err(_) => {
                tracing::error!(
                    "[bridge] forwarding to {} exceeded {:?}",
                    self.config.destination,
                    bound
                );
                Err(ForwardError::Timeout(format!(
                    "forwarding to {}",
                    self.config.destination
                )))
            }
        }
    }
}
