//! `strm` payloads: stream start/pause/unpause/stop/status/flush.
//!
//! Layout of the fixed 24-byte header:
//!
//! | bytes  | field                                   |
//! |--------|-----------------------------------------|
//! | 0      | sub-command (`s p u q t f`)             |
//! | 1      | autostart flag (ASCII digit)            |
//! | 2      | codec byte                              |
//! | 3..14  | format details (unused by this player)  |
//! | 14..18 | replay gain, 16.16 fixed point          |
//! | 18..20 | server HTTP port (0 = default)          |
//! | 20..24 | server timestamp (status request only)  |
//! | 24..   | optional HTTP request line              |

use bytes::{BufMut, Bytes, BytesMut};

use super::PayloadError;
use crate::protocol_constants::STRM_FIXED_LEN;
use crate::types::Codec;

/// `strm` sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSubCommand {
    Start,
    Pause,
    Unpause,
    Stop,
    StatusRequest,
    Flush,
}

impl StreamSubCommand {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            b's' => Some(StreamSubCommand::Start),
            b'p' => Some(StreamSubCommand::Pause),
            b'u' => Some(StreamSubCommand::Unpause),
            b'q' => Some(StreamSubCommand::Stop),
            b't' => Some(StreamSubCommand::StatusRequest),
            b'f' => Some(StreamSubCommand::Flush),
            _ => None,
        }
    }

    fn wire_byte(self) -> u8 {
        match self {
            StreamSubCommand::Start => b's',
            StreamSubCommand::Pause => b'p',
            StreamSubCommand::Unpause => b'u',
            StreamSubCommand::Stop => b'q',
            StreamSubCommand::StatusRequest => b't',
            StreamSubCommand::Flush => b'f',
        }
    }
}

/// Decoded `strm` command.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamCommand {
    pub sub_command: StreamSubCommand,
    pub autostart: bool,
    pub codec: Codec,
    pub replay_gain: f32,
    /// Server HTTP port from the command; 0 means the configured default.
    pub server_port: u16,
    /// Only meaningful for [`StreamSubCommand::StatusRequest`].
    pub server_timestamp: u32,
    pub http_request_line: Option<String>,
}

impl StreamCommand {
    /// Decodes a `strm` payload.
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        if payload.len() < STRM_FIXED_LEN {
            return Err(PayloadError::TooShort {
                command: "strm",
                expected: STRM_FIXED_LEN,
                actual: payload.len(),
            });
        }

        let sub_command = StreamSubCommand::from_wire(payload[0])
            .ok_or(PayloadError::UnknownSubCommand(payload[0]))?;
        let raw_gain = u32::from_be_bytes([payload[14], payload[15], payload[16], payload[17]]);
        let server_port = u16::from_be_bytes([payload[18], payload[19]]);
        let timestamp = u32::from_be_bytes([payload[20], payload[21], payload[22], payload[23]]);

        let http_request_line = match &payload[STRM_FIXED_LEN..] {
            [] => None,
            rest => {
                let text = std::str::from_utf8(rest).map_err(|_| PayloadError::InvalidUtf8)?;
                let line = text.lines().next().unwrap_or("").trim();
                (!line.is_empty()).then(|| line.to_string())
            }
        };

        Ok(Self {
            sub_command,
            autostart: payload[1] != b'0' && payload[1] != 0,
            codec: Codec::from_wire(payload[2]),
            replay_gain: raw_gain as f32 / 65536.0,
            server_port,
            server_timestamp: if sub_command == StreamSubCommand::StatusRequest {
                timestamp
            } else {
                0
            },
            http_request_line,
        })
    }

    /// Encodes the command back into a payload (test servers and tooling).
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let line = self.http_request_line.as_deref().unwrap_or("");
        let mut buf = BytesMut::with_capacity(STRM_FIXED_LEN + line.len());
        buf.put_u8(self.sub_command.wire_byte());
        buf.put_u8(if self.autostart { b'1' } else { b'0' });
        buf.put_u8(self.codec.wire_byte());
        buf.put_bytes(b'?', 11);
        buf.put_u32((f64::from(self.replay_gain) * 65536.0).round() as u32);
        buf.put_u16(self.server_port);
        buf.put_u32(self.server_timestamp);
        buf.put_slice(line.as_bytes());
        buf.freeze()
    }

    /// Path component of the request line (`GET /stream.mp3?player=... HTTP/1.0`).
    #[must_use]
    pub fn request_path(&self) -> Option<&str> {
        let line = self.http_request_line.as_deref()?;
        let mut parts = line.split_whitespace();
        let first = parts.next()?;
        // A bare path without a method is tolerated.
        let path = if first.starts_with('/') { first } else { parts.next()? };
        path.starts_with('/').then_some(path)
    }

    /// Start offset in seconds carried as a `start=` query parameter.
    #[must_use]
    pub fn start_offset(&self) -> f64 {
        self.request_path()
            .and_then(|path| path.split_once('?'))
            .and_then(|(_, query)| {
                query
                    .split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .find(|(key, _)| *key == "start")
                    .and_then(|(_, value)| value.parse::<f64>().ok())
            })
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(0.0)
    }
}

/// Builds a `start` command for the given codec and request path.
#[must_use]
pub fn start_command(codec: Codec, replay_gain: f32, path: &str) -> StreamCommand {
    StreamCommand {
        sub_command: StreamSubCommand::Start,
        autostart: true,
        codec,
        replay_gain,
        server_port: 0,
        server_timestamp: 0,
        http_request_line: Some(format!("GET {} HTTP/1.0", path)),
    }
}

/// Builds a payload-less command (`pause`, `stop`, status request, ...).
#[must_use]
pub fn simple_command(sub_command: StreamSubCommand, server_timestamp: u32) -> StreamCommand {
    StreamCommand {
        sub_command,
        autostart: false,
        codec: Codec::Unknown,
        replay_gain: 0.0,
        server_port: 0,
        server_timestamp,
        http_request_line: None,
    }
}
