//! Per-connection driver.
//!
//! [`handle_connection`] owns one accepted stream, feeds every decoded
//! payload to the sink in arrival order and logs how the stream ended.
//! It never fails: whatever happens on the wire becomes a [`Disconnect`].

use std::net::SocketAddr;

use tokio::io::AsyncRead;
use tracing::{error, info, info_span, warn, Instrument};

use crate::protocol::{Disconnect, FrameReader, ReadEvent};
use crate::sink::{ReceivedPayload, Sink};

/// Outcome of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    /// Remote address.
    pub peer: SocketAddr,
    /// How the stream ended.
    pub disconnect: Disconnect,
    /// Payloads handed to the sink.
    pub payloads: u64,
    /// Zero-length frames dropped.
    pub empty_frames: u64,
    /// Raw bytes read.
    pub bytes_read: u64,
    /// Sink calls that returned an error.
    pub sink_errors: u64,
}

/// Drive `stream` to its terminal state, dispatching payloads to `sink`.
///
/// The stream is dropped before returning, on every path.
pub async fn handle_connection<R, S>(
    stream: R,
    peer: SocketAddr,
    sink: &S,
    max_payload: u32,
) -> ConnectionSummary
where
    R: AsyncRead + Unpin,
    S: Sink + ?Sized,
{
    let span = info_span!("connection", peer = %peer);
    drive(stream, peer, sink, max_payload).instrument(span).await
}

async fn drive<R, S>(stream: R, peer: SocketAddr, sink: &S, max_payload: u32) -> ConnectionSummary
where
    R: AsyncRead + Unpin,
    S: Sink + ?Sized,
{
    let mut reader = FrameReader::with_max_payload(stream, max_payload);
    let mut sink_errors = 0u64;

    let disconnect = loop {
        match reader.next_event().await {
            ReadEvent::Payload(payload) => {
                let message = ReceivedPayload::new(peer, payload);
                if let Err(e) = sink.consume(&message).await {
                    sink_errors += 1;
                    error!(peer = %peer, bytes = message.len(), error = %e, "sink failed to consume payload");
                }
            }
            ReadEvent::Closed(disconnect) => break disconnect,
        }
    };

    let stats = reader.stats();
    drop(reader);

    if disconnect.is_graceful() {
        info!(
            peer = %peer,
            reason = %disconnect,
            payloads = stats.payloads,
            bytes = stats.bytes_read,
            "connection closed"
        );
    } else if let Disconnect::Truncated { expected, received } = &disconnect {
        warn!(
            peer = %peer,
            reason = %disconnect,
            expected = ?expected,
            received,
            payloads = stats.payloads,
            bytes = stats.bytes_read,
            "connection ended abnormally"
        );
    } else {
        warn!(
            peer = %peer,
            reason = %disconnect,
            payloads = stats.payloads,
            bytes = stats.bytes_read,
            "connection ended abnormally"
        );
    }

    ConnectionSummary {
        peer,
        disconnect,
        payloads: stats.payloads,
        empty_frames: stats.empty_frames,
        bytes_read: stats.bytes_read,
        sink_errors,
    }
}
