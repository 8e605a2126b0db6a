//! SlimProto wire codec.
//!
//! - [`frame`]: tag + length framing, incremental decoding
//! - [`strm`]: stream-control payloads
//! - [`audg`]: volume payloads (dual encoding)
//! - [`setd`]: player name query / rename
//! - [`status`]: `STAT` replies
//! - [`helo`]: session open / close frames
//!
//! [`InboundCommand::parse`] turns a [`ProtocolMessage`] into a typed command
//! for the dispatcher.

pub mod audg;
pub mod frame;
pub mod helo;
pub mod setd;
pub mod status;
pub mod strm;

use thiserror::Error;

pub use audg::VolumeCommand;
pub use frame::{encode_frame, FrameDecoder, FrameError, ProtocolMessage};
pub use setd::SettingCommand;
pub use status::{StatusCode, StatusReply, StatusTiming};
pub use strm::{StreamCommand, StreamSubCommand};

use crate::protocol_constants::{
    TAG_AUDE, TAG_AUDG, TAG_GRFB, TAG_GRFE, TAG_SETD, TAG_STRM, TAG_VERS, TAG_VFDC,
};

/// Errors decoding the payload of an otherwise well-framed message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{command} payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        command: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown strm sub-command {0:#04x}")]
    UnknownSubCommand(u8),

    #[error("payload text is not valid UTF-8")]
    InvalidUtf8,
}

/// Typed view of an inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundCommand {
    Stream(StreamCommand),
    Volume(VolumeCommand),
    Setting(SettingCommand),
    /// `aude` / `vers`: acknowledged with a heartbeat.
    Acknowledge([u8; 4]),
    /// `vfdc` / `grfe` / `grfb`: display updates, answered pause-aware.
    Display([u8; 4]),
    Unknown([u8; 4]),
}

impl InboundCommand {
    /// Parses a framed message into a typed command.
    pub fn parse(message: &ProtocolMessage) -> Result<Self, PayloadError> {
        let tag = message.tag();
        let payload = message.payload();
        Ok(match tag {
            TAG_STRM => InboundCommand::Stream(StreamCommand::decode(payload)?),
            TAG_AUDG => InboundCommand::Volume(VolumeCommand::decode(payload)?),
            TAG_SETD => InboundCommand::Setting(SettingCommand::decode(payload)?),
            TAG_AUDE | TAG_VERS => InboundCommand::Acknowledge(tag),
            TAG_VFDC | TAG_GRFE | TAG_GRFB => InboundCommand::Display(tag),
            _ => InboundCommand::Unknown(tag),
        })
    }
}
