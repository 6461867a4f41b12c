//! Sink module - consumers of decoded payloads.
//!
//! Provides:
//! - [`Sink`] - the seam between connection handling and payload consumers
//! - [`ConsoleSink`] - renders each payload as a bordered block for a human
//! - [`CaptureStore`] - appends payloads to a JSON file that tests poll
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use varsend::sink::{CaptureStore, Sink};
//!
//! let store = Arc::new(CaptureStore::new("/tmp/messages.json"));
//! listener.run(store.clone(), shutdown).await;
//! assert!(store.wait_for_count(2, Duration::from_secs(2)).await);
//! ```

mod capture;
mod console;

use std::borrow::Cow;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::Result;

pub use capture::{CaptureStore, CapturedMessage, DEFAULT_CAPTURE_FILE, WAIT_POLL_INTERVAL};
pub use console::{ConsoleSink, ConsoleStats};

/// Boxed future returned by sinks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A complete payload together with where and when it arrived.
#[derive(Debug, Clone)]
pub struct ReceivedPayload {
    /// Remote address of the producing connection.
    pub peer: SocketAddr,
    /// Wall-clock arrival time.
    pub received_at: SystemTime,
    /// Payload bytes, never empty.
    pub payload: Bytes,
}

impl ReceivedPayload {
    /// Stamp a payload with the current time.
    pub fn new(peer: SocketAddr, payload: Bytes) -> Self {
        Self {
            peer,
            received_at: SystemTime::now(),
            payload,
        }
    }

    /// Payload as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True for an empty payload.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Consumer of decoded payloads.
///
/// Called once per payload, in arrival order. An error is logged by the
/// connection handler and does not end the connection.
pub trait Sink: Send + Sync + 'static {
    /// Consume one payload.
    fn consume<'a>(&'a self, message: &'a ReceivedPayload) -> BoxFuture<'a, Result<()>>;
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn consume<'a>(&'a self, message: &'a ReceivedPayload) -> BoxFuture<'a, Result<()>> {
        (**self).consume(message)
    }
}
