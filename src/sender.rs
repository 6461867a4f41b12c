//! Producer side: push framed payloads to a listener.
//!
//! Used by the `send` subcommand and by tests standing in for an
//! instrumented process.

use std::io;
use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::error::{Result, VarSendError};
use crate::protocol::{encode_into, PREFIX_SIZE};

/// A connection to a listener that writes one frame per payload.
pub struct FrameSender {
    stream: Option<TcpStream>,
    peer: SocketAddr,
    buf: BytesMut,
    frames_sent: u64,
}

impl FrameSender {
    /// Connect to a listener.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!(peer = %peer, "sender connected");

        Ok(Self {
            stream: Some(stream),
            peer,
            buf: BytesMut::new(),
            frames_sent: 0,
        })
    }

    /// Remote listener address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Frames written so far, including raw frames.
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Send one payload as a frame.
    ///
    /// Empty payloads are skipped and `false` is returned; otherwise
    /// returns `true` once the frame is written.
    ///
    /// # Errors
    ///
    /// - [`VarSendError::Io`] if the payload does not fit a u32 length or the write fails
    /// - [`VarSendError::ConnectionClosed`] after [`close`](Self::close)
    pub async fn send(&mut self, payload: &[u8]) -> Result<bool> {
        if payload.is_empty() {
            trace!("empty payload skipped");
            return Ok(false);
        }

        let size = u32::try_from(payload.len()).map_err(|_| {
            VarSendError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("payload of {} bytes does not fit a 4-byte length", payload.len()),
            ))
        })?;

        self.buf.clear();
        self.buf.reserve(PREFIX_SIZE + payload.len());
        encode_into(&mut self.buf, payload);

        let stream = self.stream.as_mut().ok_or(VarSendError::ConnectionClosed)?;
        stream.write_all(&self.buf).await?;
        self.frames_sent += 1;
        trace!(bytes = size, "frame sent");
        Ok(true)
    }

    /// Write raw bytes as-is, e.g. a zero-length frame or a partial one.
    pub async fn send_raw_frame(&mut self, raw: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(VarSendError::ConnectionClosed)?;
        stream.write_all(raw).await?;
        self.frames_sent += 1;
        Ok(())
    }

    /// Flush and close the write side, ending the session gracefully.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush().await?;
            stream.shutdown().await?;
            debug!(peer = %self.peer, frames = self.frames_sent, "sender closed");
        }
        Ok(())
    }
}
