//! Console sink - bordered, timestamped blocks on a writer (stdout by default).
//!
//! Output for each payload:
//! ```text
//!
//! ===== VAR_SEND #1 [2026-01-01 12:00:00] FROM 127.0.0.1:51234 (27 bytes) =====
//!
//! --- Variable #1 ---
//! Type: string
//! Value: hello
//! ==============================================================================
//!
//! ```
//!
//! Logs belong on stderr; this sink owns stdout.

use std::collections::HashSet;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::warn;

use super::{BoxFuture, ReceivedPayload, Sink};
use crate::error::Result;

/// Running totals over everything rendered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleStats {
    /// Payloads rendered.
    pub messages: u64,
    /// Payload bytes rendered.
    pub bytes: u64,
    /// Distinct peer addresses seen.
    pub peers: usize,
}

#[derive(Default)]
struct Tally {
    messages: u64,
    bytes: u64,
    peers: HashSet<SocketAddr>,
}

/// Sink that prints every payload for a developer watching the terminal.
pub struct ConsoleSink {
    out: Mutex<Box<dyn Write + Send>>,
    tally: Mutex<Tally>,
}

impl ConsoleSink {
    /// Render to process stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Render to any writer.
    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
            tally: Mutex::new(Tally::default()),
        }
    }

    /// Totals so far.
    pub fn stats(&self) -> ConsoleStats {
        let tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
        ConsoleStats {
            messages: tally.messages,
            bytes: tally.bytes,
            peers: tally.peers.len(),
        }
    }

    fn render(&self, message: &ReceivedPayload) -> io::Result<()> {
        let number = {
            let mut tally = self.tally.lock().unwrap_or_else(|e| e.into_inner());
            tally.messages += 1;
            tally.bytes += message.len() as u64;
            tally.peers.insert(message.peer);
            tally.messages
        };

        let block = format_block(number, message);

        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        out.write_all(block.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

impl Sink for ConsoleSink {
    fn consume<'a>(&'a self, message: &'a ReceivedPayload) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if let Err(e) = self.render(message) {
                warn!(peer = %message.peer, error = %e, "console write failed");
            }
            Ok(())
        })
    }
}

/// Build the bordered block for one payload.
fn format_block(number: u64, message: &ReceivedPayload) -> String {
    let timestamp: DateTime<Local> = message.received_at.into();
    let header = format!(
        "===== VAR_SEND #{} [{}] FROM {} ({} bytes) =====",
        number,
        timestamp.format("%Y-%m-%d %H:%M:%S"),
        message.peer,
        message.len()
    );
    let footer = "=".repeat(header.chars().count());

    let text = message.text();
    let mut block = String::with_capacity(header.len() * 2 + text.len() + 8);
    block.push('\n');
    block.push_str(&header);
    block.push('\n');
    block.push_str(&text);
    if !text.ends_with('\n') {
        block.push('\n');
    }
    block.push_str(&footer);
    block.push_str("\n\n");
    block
}
