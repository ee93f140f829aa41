//! Length-prefixed codec for TCP framing
//!
//! All messages are framed as:
//! ```text
//! [ 4 bytes: length (u32, big-endian) ][ N bytes: message body ]
//! ```
//!
//! Message bodies are described in [`crate::protocol`].

use std::string::FromUtf8Error;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Maximum body size (64 KiB)
pub const MAX_MESSAGE_SIZE: u32 = 64 * 1024;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Message too large: {0} bytes (max: {MAX_MESSAGE_SIZE})")]
    MessageTooLarge(usize),

    #[error("Invalid message length prefix: {0}")]
    InvalidLength(u32),

    #[error("Not enough data: need {needed} bytes, have {available}")]
    NotEnoughData { needed: usize, available: usize },

    #[error("Unknown {kind} tag: {tag}")]
    UnknownTag { kind: &'static str, tag: u8 },

    #[error("{field} does not fit the wire format: {value}")]
    FieldOverflow { field: &'static str, value: usize },

    #[error("{0} trailing bytes after message body")]
    TrailingBytes(usize),

    #[error("Invalid UTF-8 string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
}

/// A message with a binary body
pub trait Message: Sized {
    /// Append the body to `buf`
    fn encode_body(&self, buf: &mut BytesMut) -> Result<(), CodecError>;

    /// Parse a complete body
    fn decode_body(buf: &mut Bytes) -> Result<Self, CodecError>;
}

/// Encode a message into a length-prefixed byte buffer
pub fn encode<M: Message>(message: &M) -> Result<Bytes, CodecError> {
    let mut buf = BytesMut::with_capacity(64);
    encode_into(message, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a message directly into a provided buffer
pub fn encode_into<M: Message>(message: &M, buf: &mut BytesMut) -> Result<(), CodecError> {
    let start = buf.len();

    // Placeholder length prefix, patched once the body size is known
    buf.put_u32(0);

    if let Err(e) = message.encode_body(buf) {
        buf.truncate(start);
        return Err(e);
    }

    let msg_len = buf.len() - start - 4;
    if msg_len > MAX_MESSAGE_SIZE as usize {
        buf.truncate(start);
        return Err(CodecError::MessageTooLarge(msg_len));
    }

    buf[start..start + 4].copy_from_slice(&(msg_len as u32).to_be_bytes());
    Ok(())
}

/// Try to decode a length-prefixed message from a buffer
///
/// Returns:
/// - `Ok(Some(message))` if a complete message was decoded
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is invalid
pub fn decode<M: Message>(buf: &mut BytesMut) -> Result<Option<M>, CodecError> {
    // Need at least 4 bytes for the length prefix
    if buf.len() < 4 {
        return Ok(None);
    }

    // Peek at the length prefix without consuming
    let msg_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);

    if msg_len > MAX_MESSAGE_SIZE {
        return Err(CodecError::InvalidLength(msg_len));
    }

    let total_len = 4 + msg_len as usize;
    if buf.len() < total_len {
        return Ok(None);
    }

    buf.advance(4);
    let mut body = buf.split_to(msg_len as usize).freeze();

    let message = M::decode_body(&mut body)?;
    if body.has_remaining() {
        return Err(CodecError::TrailingBytes(body.remaining()));
    }

    Ok(Some(message))
}

/// Decoder state for streaming decoding
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next<M: Message>(&mut self) -> Result<Option<M>, CodecError> {
        decode(&mut self.buffer)
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Encoder for building frames
#[derive(Debug, Default)]
pub struct FrameEncoder {
    buffer: BytesMut,
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Encode a message and add to the output buffer
    pub fn encode<M: Message>(&mut self, message: &M) -> Result<(), CodecError> {
        encode_into(message, &mut self.buffer)
    }

    /// Take the encoded bytes, leaving an empty buffer
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

/// Fail unless `buf` holds at least `needed` more bytes
pub(crate) fn ensure(buf: &Bytes, needed: usize) -> Result<(), CodecError> {
    if buf.remaining() < needed {
        return Err(CodecError::NotEnoughData {
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}

pub(crate) fn get_u8(buf: &mut Bytes) -> Result<u8, CodecError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub(crate) fn get_u16(buf: &mut Bytes) -> Result<u16, CodecError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub(crate) fn get_i32(buf: &mut Bytes) -> Result<i32, CodecError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub(crate) fn get_string(buf: &mut Bytes) -> Result<String, CodecError> {
    let len = get_u16(buf)? as usize;
    ensure(buf, len)?;
    let bytes = buf.split_to(len);
    Ok(String::from_utf8(bytes.to_vec())?)
}

pub(crate) fn put_u16_field(
    buf: &mut BytesMut,
    field: &'static str,
    value: usize,
) -> Result<(), CodecError> {
    let value = u16::try_from(value).map_err(|_| CodecError::FieldOverflow { field, value })?;
    buf.put_u16(value);
    Ok(())
}

pub(crate) fn put_string(
    buf: &mut BytesMut,
    field: &'static str,
    value: &str,
) -> Result<(), CodecError> {
    put_u16_field(buf, field, value.len())?;
    buf.put_slice(value.as_bytes());
    Ok(())
}
