// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Message framing between the bridge and the destination.
//!
//! Two framings are supported, selected at startup:
//!
//! # Newline (default)
//!
//! ```text
//! +--------------------+------+
//! | Payload (N bytes)  | '\n' |
//! +--------------------+------+
//! ```
//!
//! The reply is read in [`READ_CHUNK_SIZE`] chunks until a chunk contains the
//! delimiter or the peer closes the stream. Trailing whitespace is stripped.
//! A payload that itself contains `'\n'` cannot be framed unambiguously.
//!
//! # Length-prefixed
//!
//! ```text
//! +------------------+-------------------+
//! | Length (8 bytes) | Payload (N bytes) |
//! | little-endian    |                   |
//! +------------------+-------------------+
//! ```
//!
//! # Deadlines
//!
//! Every blocking read or write first sets the socket timeout to whatever is
//! left of its [`Deadline`], so a slow peer can never hold a request longer
//! than the configured bound.

use std::io;
use std::time::{Duration, Instant};

use byteorder::{ByteOrder, LittleEndian};
use clap::ValueEnum;

use crate::constants::{FRAME_DELIMITER, LENGTH_HEADER_SIZE, READ_CHUNK_SIZE};
use crate::destination::Transport;
use crate::errors::ForwardError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Framing {
    /// Payload followed by a single `\n`
    #[default]
    Newline,
    /// 8-byte little-endian length header followed by the payload
    LengthPrefixed,
}

/// An absolute point in time by which a protocol step must finish.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    stage: &'static str,
}

impl Deadline {
    pub fn after(timeout: Duration, stage: &'static str) -> Self {
        Self {
            at: Instant::now() + timeout,
            stage,
        }
    }

    /// Time left before the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::Timeout`] once the deadline has passed.
    pub fn remaining(&self) -> Result<Duration, ForwardError> {
        let remaining = self.at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.expired());
        }
        Ok(remaining)
    }

    fn expired(&self) -> ForwardError {
        ForwardError::Timeout(self.stage.to_string())
    }
}

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn send_error(deadline: &Deadline, err: io::Error) -> ForwardError {
    if is_timeout(&err) {
        deadline.expired()
    } else {
        ForwardError::SendFailed(err.to_string())
    }
}

fn receive_error(deadline: &Deadline, err: io::Error) -> ForwardError {
    if is_timeout(&err) {
        deadline.expired()
    } else {
        ForwardError::ReceiveFailed(err.to_string())
    }
}

/// Sends one framed message.
///
/// Partial writes are retried until the whole frame is written.
///
/// # Errors
///
/// - [`ForwardError::Timeout`] if the deadline passes before the frame is flushed
/// - [`ForwardError::SendFailed`] if the stream errors
#[tracing::instrument(skip(stream, payload, deadline), fields(bytes = payload.len()))]
pub fn send_frame<T: Transport + ?Sized>(
    stream: &mut T,
    payload: &[u8],
    framing: Framing,
    deadline: &Deadline,
) -> Result<(), ForwardError> {
    let mut frame = Vec::with_capacity(payload.len() + LENGTH_HEADER_SIZE);
    match framing {
        Framing::Newline => {
            frame.extend_from_slice(payload);
            frame.push(FRAME_DELIMITER);
        }
        Framing::LengthPrefixed => {
            let mut header_buf = [0; LENGTH_HEADER_SIZE];
            LittleEndian::write_u64(&mut header_buf, payload.len() as u64);
            frame.extend_from_slice(&header_buf);
            frame.extend_from_slice(payload);
        }
    }

    let mut written = 0;
    while written < frame.len() {
        stream
            .set_write_timeout(Some(deadline.remaining()?))
            .map_err(|err| ForwardError::SendFailed(err.to_string()))?;

        match stream.write(&frame[written..]) {
            Ok(0) => {
                return Err(ForwardError::SendFailed(
                    "connection closed while sending".to_string(),
                ));
            }
            Ok(n) => written += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(send_error(deadline, err)),
        }
    }
    stream.flush().map_err(|err| send_error(deadline, err))?;

    tracing::trace!("[bridge] sent frame ({} bytes)", frame.len());

    Ok(())
}

/// Receives one framed reply.
///
/// # Errors
///
/// - [`ForwardError::Timeout`] if the deadline passes first
/// - [`ForwardError::ReplyTooLarge`] if the reply exceeds `max_reply_bytes`
/// - [`ForwardError::ReceiveFailed`] if the stream errors, or closes partway
///   through a length-prefixed frame
///
/// A newline-framed peer that closes without sending anything yields an
/// empty reply.
#[tracing::instrument(skip(stream, deadline))]
pub fn recv_frame<T: Transport + ?Sized>(
    stream: &mut T,
    framing: Framing,
    max_reply_bytes: usize,
    deadline: &Deadline,
) -> Result<Vec<u8>, ForwardError> {
    match framing {
        Framing::Newline => recv_delimited(stream, max_reply_bytes, deadline),
        Framing::LengthPrefixed => recv_length_prefixed(stream, max_reply_bytes, deadline),
    }
}

fn recv_delimited<T: Transport + ?Sized>(
    stream: &mut T,
    max_reply_bytes: usize,
    deadline: &Deadline,
) -> Result<Vec<u8>, ForwardError> {
    let mut reply = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        stream
            .set_read_timeout(Some(deadline.remaining()?))
            .map_err(|err| ForwardError::ReceiveFailed(err.to_string()))?;

        let read = match stream.read(&mut chunk) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(receive_error(deadline, err)),
        };

        if read == 0 {
            if reply.is_empty() {
                tracing::debug!("[bridge] peer closed without replying");
            } else {
                tracing::debug!("[bridge] peer closed without a delimiter, using partial reply");
            }
            break;
        }

        let received = &chunk[..read];
        let delimiter = received.iter().position(|b| *b == FRAME_DELIMITER);
        let frame_part = match delimiter {
            Some(index) => {
                if index + 1 < read {
                    tracing::debug!(
                        "[bridge] discarding {} bytes after the reply delimiter",
                        read - index - 1
                    );
                }
                &received[..index]
            }
            None => received,
        };

        if reply.len() + frame_part.len() > max_reply_bytes {
            return Err(ForwardError::ReplyTooLarge {
                size: (reply.len() + frame_part.len()) as u64,
                max: max_reply_bytes,
            });
        }
        reply.extend_from_slice(frame_part);

        if delimiter.is_some() {
            break;
        }
    }

    let trimmed = reply.trim_ascii_end().len();
    reply.truncate(trimmed);

    tracing::trace!("[bridge] received reply ({} bytes)", reply.len());

    Ok(reply)
}

fn recv_length_prefixed<T: Transport + ?Sized>(
    stream: &mut T,
    max_reply_bytes: usize,
    deadline: &Deadline,
) -> Result<Vec<u8>, ForwardError> {
    let mut size_buf = [0; LENGTH_HEADER_SIZE];
    read_exact_by(stream, &mut size_buf, deadline)?;

    // Validate message size to prevent memory exhaustion
    let size = LittleEndian::read_u64(&size_buf);
    if size > max_reply_bytes as u64 {
        return Err(ForwardError::ReplyTooLarge {
            size,
            max: max_reply_bytes,
        });
    }

    let mut payload_buffer = vec![0; size as usize];
    read_exact_by(stream, &mut payload_buffer, deadline)?;

    tracing::trace!("[bridge] received reply ({} bytes)", payload_buffer.len());

    Ok(payload_buffer)
}

/// Fills `buf` completely, re-arming the read timeout before every read.
fn read_exact_by<T: Transport + ?Sized>(
    stream: &mut T,
    buf: &mut [u8],
    deadline: &Deadline,
) -> Result<(), ForwardError> {
    let mut filled = 0;
    while filled < buf.len() {
        stream
            .set_read_timeout(Some(deadline.remaining()?))
            .map_err(|err| ForwardError::ReceiveFailed(err.to_string()))?;

        match stream.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ForwardError::ReceiveFailed(format!(
                    "connection closed after {filled} of {} frame bytes",
                    buf.len()
                )));
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(receive_error(deadline, err)),
        }
    }
    Ok(())
}
