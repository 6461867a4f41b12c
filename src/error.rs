//! Error types for varsend.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for all varsend operations.
#[derive(Debug, Error)]
pub enum VarSendError {
    /// I/O error during socket or capture file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (capture store only).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The listening socket could not be created or bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The bound socket could not be put into listening state.
    #[error("failed to listen on {addr}: {source}")]
    Listen {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Fewer than 4 bytes were handed to the prefix decoder.
    #[error("malformed length prefix: expected 4 bytes, got {got}")]
    MalformedPrefix { got: usize },

    /// A frame announced more payload than the configured maximum.
    #[error("payload length {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u32, max: u32 },

    /// Invalid host, port or environment override.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type alias using VarSendError.
pub type Result<T> = std::result::Result<T, VarSendError>;
