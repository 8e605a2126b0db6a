//! `setd` payloads: player settings. Only id 0 (player name) is handled.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::encode_frame;
use super::PayloadError;
use crate::protocol_constants::{SETD_PLAYER_NAME, TAG_SETD_REPLY};

/// Decoded `setd` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingCommand {
    /// Server asks for the current player name.
    QueryName,
    /// Server assigns a new player name.
    SetName(String),
    /// Any other setting id; acknowledged and otherwise ignored.
    Other(u8),
}

impl SettingCommand {
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        let (&id, rest) = payload.split_first().ok_or(PayloadError::TooShort {
            command: "setd",
            expected: 1,
            actual: 0,
        })?;

        if id != SETD_PLAYER_NAME {
            return Ok(SettingCommand::Other(id));
        }
        if rest.is_empty() {
            return Ok(SettingCommand::QueryName);
        }

        // Names arrive NUL-terminated from some servers.
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        let name = std::str::from_utf8(&rest[..end]).map_err(|_| PayloadError::InvalidUtf8)?;
        Ok(SettingCommand::SetName(name.to_string()))
    }
}

/// `SETD` frame reporting the player name.
#[must_use]
pub fn encode_name_reply(name: &str) -> Bytes {
    let mut payload = BytesMut::with_capacity(1 + name.len());
    payload.put_u8(SETD_PLAYER_NAME);
    payload.put_slice(name.as_bytes());
    encode_frame(TAG_SETD_REPLY, &payload)
}
