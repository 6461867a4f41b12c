//! Per-connection frame reader.
//!
//! Wraps any `AsyncRead` and turns its byte stream into a sequence of
//! payloads, ending with exactly one [`Disconnect`] that says how the stream
//! finished. Short reads are normal; a partially received frame is dropped
//! when the stream ends and never surfaces as a payload.
//!
//! # Example
//!
//! ```ignore
//! use varsend::protocol::{FrameReader, ReadEvent};
//!
//! let mut reader = FrameReader::new(stream);
//! loop {
//!     match reader.next_event().await {
//!         ReadEvent::Payload(payload) => println!("{} bytes", payload.len()),
//!         ReadEvent::Closed(reason) => break,
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use super::codec::MAX_FRAME_PAYLOAD;
use super::frame_buffer::{FrameBuffer, FramePhase};

/// Size of a single socket read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// How a connection's byte stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Peer closed exactly at a frame boundary.
    Graceful,
    /// Peer reset the connection.
    Reset,
    /// Stream ended inside a prefix or payload; the partial frame was dropped.
    Truncated {
        /// Announced payload length, `None` if the prefix itself was cut short.
        expected: Option<u32>,
        /// Bytes of the partial prefix or payload that had arrived.
        received: usize,
    },
    /// Any other transport or protocol failure.
    Error(String),
}

impl Disconnect {
    /// True for a clean end of session.
    #[inline]
    pub fn is_graceful(&self) -> bool {
        matches!(self, Disconnect::Graceful)
    }

    /// Classify a read error.
    fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset => Disconnect::Reset,
            _ => Disconnect::Error(err.to_string()),
        }
    }

    /// Classify an end of stream from where the buffer stood.
    fn from_eof(phase: FramePhase) -> Self {
        match phase {
            FramePhase::AwaitingPrefix { buffered: 0 } => Disconnect::Graceful,
            FramePhase::AwaitingPrefix { buffered } => Disconnect::Truncated {
                expected: None,
                received: buffered,
            },
            FramePhase::AwaitingPayload { expected, received } => Disconnect::Truncated {
                expected: Some(expected),
                received,
            },
        }
    }
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disconnect::Graceful => f.write_str("graceful"),
            Disconnect::Reset => f.write_str("reset"),
            Disconnect::Truncated { .. } => f.write_str("truncated"),
            Disconnect::Error(detail) => write!(f, "error:{}", detail),
        }
    }
}

/// One step of reader output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete, non-empty payload.
    Payload(Bytes),
    /// The stream is finished. Repeated calls keep returning this.
    Closed(Disconnect),
}

/// Running totals for one connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Raw bytes read from the transport.
    pub bytes_read: u64,
    /// Non-empty payloads yielded.
    pub payloads: u64,
    /// Zero-length frames decoded and dropped.
    pub empty_frames: u64,
}

/// Stateful reader yielding payloads from a byte stream.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    /// Payloads decoded but not yet handed out.
    ready: VecDeque<Bytes>,
    /// Terminal state to report once `ready` drains.
    pending_close: Option<Disconnect>,
    /// Terminal state already reported.
    closed: Option<Disconnect>,
    read_buf: Vec<u8>,
    stats: ReaderStats,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with no payload limit beyond the prefix range.
    pub fn new(reader: R) -> Self {
        Self::with_max_payload(reader, MAX_FRAME_PAYLOAD)
    }

    /// Create a reader that ends the stream on any frame larger than `max_payload`.
    pub fn with_max_payload(reader: R, max_payload: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_max_payload(max_payload),
            ready: VecDeque::new(),
            pending_close: None,
            closed: None,
            read_buf: vec![0u8; READ_CHUNK_SIZE],
            stats: ReaderStats::default(),
        }
    }

    /// Wait for the next payload or the terminal state.
    ///
    /// Suspends only inside the underlying read.
    pub async fn next_event(&mut self) -> ReadEvent {
        loop {
            if let Some(payload) = self.ready.pop_front() {
                self.stats.payloads += 1;
                return ReadEvent::Payload(payload);
            }

            if let Some(reason) = &self.closed {
                return ReadEvent::Closed(reason.clone());
            }

            if let Some(reason) = self.pending_close.take() {
                return ReadEvent::Closed(self.finish(reason));
            }

            match self.reader.read(&mut self.read_buf).await {
                Ok(0) => {
                    let reason = Disconnect::from_eof(self.buffer.phase());
                    return ReadEvent::Closed(self.finish(reason));
                }
                Ok(n) => {
                    self.stats.bytes_read += n as u64;
                    self.buffer.extend(&self.read_buf[..n]);
                    self.drain_buffer();
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let reason = Disconnect::from_io(&e);
                    return ReadEvent::Closed(self.finish(reason));
                }
            }
        }
    }

    /// Move every complete payload out of the buffer.
    fn drain_buffer(&mut self) {
        loop {
            match self.buffer.next_payload() {
                Ok(Some(payload)) if payload.is_empty() => {
                    self.stats.empty_frames += 1;
                    debug!("zero-length frame received");
                }
                Ok(Some(payload)) => self.ready.push_back(payload),
                Ok(None) => return,
                Err(e) => {
                    self.pending_close = Some(Disconnect::Error(e.to_string()));
                    return;
                }
            }
        }
    }

    /// Record the terminal state, dropping any partial frame.
    fn finish(&mut self, reason: Disconnect) -> Disconnect {
        self.buffer.clear();
        self.closed = Some(reason.clone());
        reason
    }

    /// Where the reader stands within the current frame.
    pub fn phase(&self) -> FramePhase {
        self.buffer.phase()
    }

    /// Totals so far.
    pub fn stats(&self) -> ReaderStats {
        self.stats
    }
}
