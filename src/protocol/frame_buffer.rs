//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` so completed payloads are split off the read
//! buffer without copying. Parsing is a two-state machine:
//! - `AwaitingPrefix`: need 4 bytes of length prefix
//! - `AwaitingPayload`: prefix decoded, need `expected` payload bytes
//!
//! # Example
//!
//! ```
//! use varsend::protocol::{encode, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let frame = encode(b"hello");
//!
//! // Bytes arrive in arbitrary chunks from the socket
//! assert!(buffer.push(&frame[..3]).unwrap().is_empty());
//! let payloads = buffer.push(&frame[3..]).unwrap();
//! assert_eq!(&payloads[0][..], b"hello");
//! ```

use bytes::{Bytes, BytesMut};

use super::codec::{decode_prefix, MAX_FRAME_PAYLOAD, PREFIX_SIZE};
use crate::error::{Result, VarSendError};

/// Initial capacity of the accumulation buffer.
const INITIAL_CAPACITY: usize = 64 * 1024;

/// Upper bound on capacity reserved from an announced length alone.
const MAX_UPFRONT_RESERVE: usize = 16 * 1024 * 1024;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for a complete length prefix.
    AwaitingPrefix,
    /// Prefix decoded, waiting for `expected` payload bytes.
    AwaitingPayload { expected: u32 },
}

/// Where the buffer currently stands within a frame.
///
/// Used by the reader to classify an end of stream: only
/// `AwaitingPrefix { buffered: 0 }` is a clean frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Between frames or inside a prefix; `buffered` is 0..=3.
    AwaitingPrefix { buffered: usize },
    /// Inside a payload of `expected` bytes, `received` of them buffered.
    AwaitingPayload { expected: u32, received: usize },
}

impl FramePhase {
    /// True when no partial frame is held.
    #[inline]
    pub fn is_boundary(&self) -> bool {
        matches!(self, FramePhase::AwaitingPrefix { buffered: 0 })
    }
}

/// Buffer for accumulating incoming bytes and extracting complete payloads.
///
/// Zero-length frames are returned as empty payloads; deciding what to do
/// with them is left to the caller.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum accepted payload length.
    max_payload_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with no payload limit beyond the prefix range.
    pub fn new() -> Self {
        Self::with_max_payload(MAX_FRAME_PAYLOAD)
    }

    /// Create a new frame buffer with a custom max payload size.
    pub fn with_max_payload(max_payload_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            state: State::AwaitingPrefix,
            max_payload_size,
        }
    }

    /// Push data into the buffer and extract all complete payloads.
    ///
    /// Partial data is kept for the next push. Payloads come back in wire
    /// order, including empty ones for zero-length frames.
    ///
    /// # Errors
    ///
    /// Returns [`VarSendError::PayloadTooLarge`] if a prefix announces more
    /// than the configured maximum. The buffer should be discarded after that.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.extend(data);

        let mut payloads = Vec::new();
        while let Some(payload) = self.next_payload()? {
            payloads.push(payload);
        }

        Ok(payloads)
    }

    /// Append data to the buffer without extracting payloads.
    ///
    /// Pair with [`next_payload`](Self::next_payload) when payloads completed
    /// before a protocol violation must still be observed.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to extract a single payload from the buffer.
    ///
    /// Returns:
    /// - `Ok(Some(payload))` if a complete frame was extracted
    /// - `Ok(None)` if more data is needed
    /// - `Err(...)` if the next prefix exceeds the payload limit
    pub fn next_payload(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                State::AwaitingPrefix => {
                    if self.buffer.len() < PREFIX_SIZE {
                        return Ok(None);
                    }

                    let expected = decode_prefix(&self.buffer[..PREFIX_SIZE])?;
                    if expected > self.max_payload_size {
                        return Err(VarSendError::PayloadTooLarge {
                            size: expected,
                            max: self.max_payload_size,
                        });
                    }

                    let _ = self.buffer.split_to(PREFIX_SIZE);

                    if expected == 0 {
                        return Ok(Some(Bytes::new()));
                    }

                    self.buffer
                        .reserve((expected as usize).min(MAX_UPFRONT_RESERVE));
                    self.state = State::AwaitingPayload { expected };
                }

                State::AwaitingPayload { expected } => {
                    let expected = expected as usize;
                    if self.buffer.len() < expected {
                        return Ok(None);
                    }

                    let payload = self.buffer.split_to(expected).freeze();
                    self.state = State::AwaitingPrefix;
                    return Ok(Some(payload));
                }
            }
        }
    }

    /// Current position within the frame being assembled.
    pub fn phase(&self) -> FramePhase {
        match self.state {
            State::AwaitingPrefix => FramePhase::AwaitingPrefix {
                buffered: self.buffer.len(),
            },
            State::AwaitingPayload { expected } => FramePhase::AwaitingPayload {
                expected,
                received: self.buffer.len(),
            },
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any partial frame and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::AwaitingPrefix;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
