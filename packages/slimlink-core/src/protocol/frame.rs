//! Frame layer: `[tag:4][length:u32 BE][payload]`.
//!
//! Decoding is incremental. Socket reads append to a [`FrameDecoder`] and
//! complete frames are pulled out one at a time; a partial frame stays
//! buffered until the rest arrives.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::protocol_constants::{FRAME_HEADER_LEN, MAX_FRAME_PAYLOAD};

/// Errors raised while splitting the byte stream into frames.
///
/// None of these are fatal to the session: the decoder drops what it has
/// buffered and waits for fresh bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// Declared payload length exceeds [`MAX_FRAME_PAYLOAD`].
    #[error("declared frame length {0} exceeds limit")]
    Oversized(usize),

    /// Command tag contains non-ASCII-alphanumeric bytes.
    #[error("invalid command tag {0:?}")]
    InvalidTag([u8; 4]),
}

/// One protocol message: a 4-character command tag and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    tag: [u8; 4],
    payload: Bytes,
}

impl ProtocolMessage {
    #[must_use]
    pub fn new(tag: [u8; 4], payload: impl Into<Bytes>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    #[must_use]
    pub fn tag(&self) -> [u8; 4] {
        self.tag
    }

    /// Tag as text, for logging.
    #[must_use]
    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serializes the message into a complete frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        encode_frame(self.tag, &self.payload)
    }
}

/// Builds a frame from a tag and payload.
#[must_use]
pub fn encode_frame(tag: [u8; 4], payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_slice(&tag);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Resumable frame splitter over a growing byte buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends freshly read bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes buffered but not yet returned as a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Pulls the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed. On a frame error the
    /// buffer is cleared so the next read starts clean.
    pub fn next_frame(&mut self) -> Result<Option<ProtocolMessage>, FrameError> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let mut tag = [0u8; 4];
        tag.copy_from_slice(&self.buf[..4]);
        let declared = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]])
            as usize;

        if !tag.iter().all(|b| b.is_ascii_alphanumeric() || *b == b'!') {
            self.buf.clear();
            return Err(FrameError::InvalidTag(tag));
        }
        if declared > MAX_FRAME_PAYLOAD {
            self.buf.clear();
            return Err(FrameError::Oversized(declared));
        }
        if self.buf.len() < FRAME_HEADER_LEN + declared {
            return Ok(None);
        }

        self.buf.advance(FRAME_HEADER_LEN);
        let payload = self.buf.split_to(declared).freeze();
        Ok(Some(ProtocolMessage { tag, payload }))
    }
}
