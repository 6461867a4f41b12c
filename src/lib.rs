//! # varsend
//!
//! Listener for debug telemetry pushed by instrumented processes.
//!
//! Producers open a TCP connection and write one frame per message: a
//! 4-byte big-endian length followed by that many payload bytes. The
//! listener splits the stream back into payloads and hands each to a
//! [`Sink`]: the [`ConsoleSink`] prints it for a developer, the
//! [`CaptureStore`] appends it to a JSON file that test harnesses poll.
//!
//! ## Architecture
//!
//! - [`protocol`]: framing codec, frame buffer and per-connection reader
//! - [`connection`]: drives one connection to its terminal state
//! - [`listener`]: socket setup and the one-connection-at-a-time accept loop
//! - [`sink`]: payload consumers
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use varsend::{CaptureStore, FrameSender, ListenerHandle, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> varsend::error::Result<()> {
//!     let store = Arc::new(CaptureStore::new("/tmp/messages.json"));
//!     let handle = ListenerHandle::spawn(&ServerConfig::default().port(0), store.clone()).await?;
//!
//!     let mut sender = FrameSender::connect(handle.local_addr()).await?;
//!     sender.send(b"Hello").await?;
//!     sender.close().await?;
//!
//!     assert!(store.wait_for_count(1, Duration::from_secs(2)).await);
//!     handle.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod listener;
pub mod poll;
pub mod protocol;
pub mod sender;
pub mod sink;

pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionSummary};
pub use error::VarSendError;
pub use listener::{AcceptMode, Listener, ListenerHandle, ListenerStats};
pub use protocol::Disconnect;
pub use sender::FrameSender;
pub use sink::{CaptureStore, CapturedMessage, ConsoleSink, ReceivedPayload, Sink};
