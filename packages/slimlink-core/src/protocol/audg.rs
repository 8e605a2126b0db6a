//! `audg` payloads: volume.
//!
//! Servers have sent gain in two encodings over the years. Values up to 128
//! are on the old 0–128 scale; anything larger is 16.16 fixed point.

use super::PayloadError;

/// Largest raw value interpreted on the 0–128 scale.
const LEGACY_SCALE_MAX: u32 = 128;

/// Decoded `audg` command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCommand {
    pub raw_left: u32,
    pub raw_right: u32,
}

impl VolumeCommand {
    pub fn decode(payload: &[u8]) -> Result<Self, PayloadError> {
        if payload.len() < 8 {
            return Err(PayloadError::TooShort {
                command: "audg",
                expected: 8,
                actual: payload.len(),
            });
        }
        Ok(Self {
            raw_left: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
            raw_right: u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]),
        })
    }

    /// Output volume in `[0.0, 1.0]`, driven by the left channel.
    #[must_use]
    pub fn normalized(&self) -> f32 {
        normalize_gain(self.raw_left)
    }
}

/// Normalizes one raw gain value.
#[must_use]
pub fn normalize_gain(raw: u32) -> f32 {
    let value = if raw <= LEGACY_SCALE_MAX {
        raw as f32 / 128.0
    } else {
        raw as f32 / 65536.0
    };
    value.clamp(0.0, 1.0)
}
