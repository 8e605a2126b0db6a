//! `STAT` replies: the fixed 4-character status codes the player sends back.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::encode_frame;
use crate::protocol_constants::{STAT_EXTENSION_LEN, TAG_STAT};

/// Status codes sent to the server.
///
/// Each distinct client-to-server signal has its own code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// Flush / stream-start acknowledged.
    FlushAck,
    /// Stream connection to the server's HTTP endpoint established.
    ConnectedAck,
    /// Audio output started.
    PlaybackStarted,
    /// Periodic heartbeat / generic acknowledgment.
    Heartbeat,
    Paused,
    Resumed,
    /// Current track finished decoding; ready for the next one.
    DecoderReady,
    /// No further track was queued.
    EndOfPlaylist,
    /// Command could not be executed.
    NotSupported,
}

impl StatusCode {
    #[must_use]
    pub fn code(self) -> &'static [u8; 4] {
        match self {
            StatusCode::FlushAck => b"STMf",
            StatusCode::ConnectedAck => b"STMc",
            StatusCode::PlaybackStarted => b"STMs",
            StatusCode::Heartbeat => b"STMt",
            StatusCode::Paused => b"STMp",
            StatusCode::Resumed => b"STMr",
            StatusCode::DecoderReady => b"STMd",
            StatusCode::EndOfPlaylist => b"STMu",
            StatusCode::NotSupported => b"STMn",
        }
    }

    /// Parses a code back, used by tests and diagnostic tooling.
    #[must_use]
    pub fn from_code(code: &[u8]) -> Option<Self> {
        [
            StatusCode::FlushAck,
            StatusCode::ConnectedAck,
            StatusCode::PlaybackStarted,
            StatusCode::Heartbeat,
            StatusCode::Paused,
            StatusCode::Resumed,
            StatusCode::DecoderReady,
            StatusCode::EndOfPlaylist,
            StatusCode::NotSupported,
        ]
        .into_iter()
        .find(|s| s.code().as_slice() == code)
    }
}

/// Round-trip diagnostics appended to a status reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusTiming {
    pub jiffies: u32,
    pub elapsed_seconds: u32,
    pub elapsed_millis: u32,
    /// Echo of the server's timestamp from a status request, 0 when unknown.
    pub server_timestamp: u32,
}

/// A status reply ready to be framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReply {
    pub code: StatusCode,
    pub timing: Option<StatusTiming>,
}

impl StatusReply {
    #[must_use]
    pub fn new(code: StatusCode) -> Self {
        Self { code, timing: None }
    }

    #[must_use]
    pub fn with_timing(code: StatusCode, timing: StatusTiming) -> Self {
        Self {
            code,
            timing: Some(timing),
        }
    }

    /// `STAT` payload: code, then the optional 16-byte extension.
    #[must_use]
    pub fn payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4 + STAT_EXTENSION_LEN);
        buf.put_slice(self.code.code());
        if let Some(t) = self.timing {
            buf.put_u32(t.jiffies);
            buf.put_u32(t.elapsed_seconds);
            buf.put_u32(t.elapsed_millis);
            buf.put_u32(t.server_timestamp);
        }
        buf.freeze()
    }

    /// Complete `STAT` frame.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        encode_frame(TAG_STAT, &self.payload())
    }

    /// Parses a `STAT` payload. Used on the server side of tests.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let code = StatusCode::from_code(payload.get(..4)?)?;
        let timing = if payload.len() >= 4 + STAT_EXTENSION_LEN {
            let word = |i: usize| {
                let at = 4 + i * 4;
                u32::from_be_bytes([payload[at], payload[at + 1], payload[at + 2], payload[at + 3]])
            };
            Some(StatusTiming {
                jiffies: word(0),
                elapsed_seconds: word(1),
                elapsed_millis: word(2),
                server_timestamp: word(3),
            })
        } else {
            None
        };
        Some(Self { code, timing })
    }
}
