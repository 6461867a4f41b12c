//! Protocol module - length-prefix framing and per-connection reading.
//!
//! This module implements the wire side of the listener:
//! - 4-byte big-endian length prefix encoding/decoding
//! - Frame buffer for accumulating partial reads
//! - Frame reader that classifies how a stream ended

mod codec;
mod frame_buffer;
mod reader;

pub use codec::{decode_prefix, encode, encode_into, MAX_FRAME_PAYLOAD, PREFIX_SIZE};
pub use frame_buffer::{FrameBuffer, FramePhase};
pub use reader::{Disconnect, FrameReader, ReadEvent, ReaderStats};
