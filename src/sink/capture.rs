//! Capture store - durable JSON log of received payloads for test harnesses.
//!
//! The file holds a single JSON array, in arrival order:
//! ```text
//! [{"timestamp": 1760870400.123, "data": "Hello"}, ...]
//! ```
//! A missing file is an empty store. Every append rewrites the whole file
//! (read, push, write to a temp file, rename), so exactly one listener may
//! write a given file at a time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{BoxFuture, ReceivedPayload, Sink};
use crate::error::{Result, VarSendError};
use crate::poll::poll_until;

/// File name used under the system temp dir when no path is given.
pub const DEFAULT_CAPTURE_FILE: &str = "var_send_test_messages.json";

/// Interval between reads in [`CaptureStore::wait_for_count`].
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One captured payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedMessage {
    /// Arrival time in seconds since the Unix epoch.
    pub timestamp: f64,
    /// Payload as text.
    pub data: String,
}

impl CapturedMessage {
    /// Build a record from a received payload.
    pub fn from_payload(message: &ReceivedPayload) -> Self {
        let timestamp = message
            .received_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            timestamp,
            data: message.text().into_owned(),
        }
    }
}

/// File-backed, append-only log of captured messages.
pub struct CaptureStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl CaptureStore {
    /// Create a store backed by `path`. Nothing is touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `<temp dir>/var_send_test_messages.json`.
    pub fn default_path() -> PathBuf {
        std::env::temp_dir().join(DEFAULT_CAPTURE_FILE)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All captured messages, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn list(&self) -> Result<Vec<CapturedMessage>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        Ok(serde_json::from_str(&content)?)
    }

    /// Append one message, rewriting the whole file.
    ///
    /// An unparseable existing file is replaced rather than blocking capture.
    pub async fn append(&self, message: CapturedMessage) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut messages = match self.list().await {
            Ok(messages) => messages,
            Err(VarSendError::Json(e)) => {
                warn!(path = %self.path.display(), error = %e, "capture file unreadable, starting fresh");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        messages.push(message);

        self.write_all(&messages).await?;
        debug!(path = %self.path.display(), count = messages.len(), "message captured");
        Ok(())
    }

    /// Delete every captured message (removes the file).
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait until at least `count` messages are captured.
    ///
    /// Re-reads the file every [`WAIT_POLL_INTERVAL`]. Returns `false` if
    /// `timeout` elapses first; read errors count as "not yet".
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        poll_until(WAIT_POLL_INTERVAL, Some(timeout), || async move {
            match self.list().await {
                Ok(messages) if messages.len() >= count => Some(()),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "capture file not readable yet");
                    None
                }
            }
        })
        .await
        .is_some()
    }

    /// Replace the file contents via temp file and rename.
    async fn write_all(&self, messages: &[CapturedMessage]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let serialized = serde_json::to_vec(messages)?;
        let temp_path = self
            .path
            .with_extension(format!("json.{}.tmp", std::process::id()));

        tokio::fs::write(&temp_path, &serialized).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

impl Sink for CaptureStore {
    fn consume<'a>(&'a self, message: &'a ReceivedPayload) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.append(CapturedMessage::from_payload(message)).await })
    }
}
