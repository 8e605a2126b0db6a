//! `HELO` and `BYE!`: the frames that open and close a session.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::encode_frame;
use crate::config::PlayerIdentity;
use crate::protocol_constants::{
    FIRMWARE_REVISION, MAX_SAMPLE_RATE, MODEL_NAME, TAG_BYE, TAG_HELO,
};
use crate::types::Codec;

/// Capability string advertised after the fixed `HELO` fields.
#[must_use]
pub fn capabilities(identity: &PlayerIdentity) -> String {
    let codecs: Vec<&str> = Codec::SUPPORTED
        .iter()
        .map(|c| c.capability_name())
        .collect();
    format!(
        "Model={},ModelName={},{},MaxSampleRate={}",
        MODEL_NAME,
        identity.model_name,
        codecs.join(","),
        MAX_SAMPLE_RATE
    )
}

/// Builds the `HELO` frame.
///
/// `bytes_received` lets the server know whether this is a reconnect in the
/// middle of a stream (non-zero) or a fresh start.
#[must_use]
pub fn encode_helo(identity: &PlayerIdentity, bytes_received: u64) -> Bytes {
    let caps = capabilities(identity);
    let mut payload = BytesMut::with_capacity(36 + caps.len());
    payload.put_u8(identity.device_id);
    payload.put_u8(FIRMWARE_REVISION);
    payload.put_slice(&identity.mac);
    payload.put_slice(identity.uuid.as_bytes());
    // WLAN channel list: none, wired / unknown.
    payload.put_u16(0);
    payload.put_u64(bytes_received);
    payload.put_slice(b"en");
    payload.put_slice(caps.as_bytes());
    encode_frame(TAG_HELO, &payload)
}

/// Builds the `BYE!` frame sent before a clean disconnect.
#[must_use]
pub fn encode_bye() -> Bytes {
    encode_frame(TAG_BYE, &[0])
}
