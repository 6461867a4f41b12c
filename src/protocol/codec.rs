//! Length-prefix encoding and decoding.
//!
//! Every message on the wire is one frame:
//! ```text
//! ┌──────────────┬─────────────────────────┐
//! │ Length       │ Payload                 │
//! │ 4 bytes      │ `length` bytes          │
//! │ uint32 BE    │ opaque, producer-defined│
//! └──────────────┴─────────────────────────┘
//! ```
//!
//! Nothing here performs I/O.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, VarSendError};

/// Size of the length prefix in bytes (fixed, exactly 4).
pub const PREFIX_SIZE: usize = 4;

/// Largest payload a single frame can announce.
pub const MAX_FRAME_PAYLOAD: u32 = u32::MAX;

/// Encode a payload into a complete frame (prefix followed by payload).
///
/// # Panics
///
/// Panics if the payload is longer than `u32::MAX` bytes, which the
/// prefix cannot express.
///
/// # Example
///
/// ```
/// use varsend::protocol::{encode, PREFIX_SIZE};
///
/// let frame = encode(b"hello");
/// assert_eq!(frame.len(), PREFIX_SIZE + 5);
/// assert_eq!(&frame[..PREFIX_SIZE], &[0, 0, 0, 5]);
/// ```
pub fn encode(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(PREFIX_SIZE + payload.len());
    encode_into(&mut buf, payload);
    buf.freeze()
}

/// Append a complete frame to an existing buffer.
///
/// # Panics
///
/// Panics if the payload is longer than `u32::MAX` bytes.
pub fn encode_into(buf: &mut BytesMut, payload: &[u8]) {
    let len = u32::try_from(payload.len()).expect("payload length exceeds u32::MAX");
    buf.reserve(PREFIX_SIZE + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(payload);
}

/// Decode the announced payload length from a prefix.
///
/// Only the first [`PREFIX_SIZE`] bytes are inspected; callers are expected
/// to hand over exactly four.
///
/// # Errors
///
/// Returns [`VarSendError::MalformedPrefix`] if fewer than 4 bytes are given.
///
/// # Example
///
/// ```
/// use varsend::protocol::decode_prefix;
///
/// assert_eq!(decode_prefix(&[0, 0, 1, 0]).unwrap(), 256);
/// assert!(decode_prefix(&[0, 0]).is_err());
/// ```
pub fn decode_prefix(buf: &[u8]) -> Result<u32> {
    if buf.len() < PREFIX_SIZE {
        return Err(VarSendError::MalformedPrefix { got: buf.len() });
    }
    Ok(u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]))
}
