//! Shared value types: codecs, connection states and transport commands.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// Audio codec named by a `strm` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Aac,
    Alac,
    Mp3,
    Flac,
    Pcm,
    Ogg,
    Opus,
    /// Any codec byte not in the table. Never played.
    Unknown,
}

impl Codec {
    /// Every playable codec, in capability-string order.
    pub const SUPPORTED: [Codec; 7] = [
        Codec::Flac,
        Codec::Pcm,
        Codec::Mp3,
        Codec::Ogg,
        Codec::Aac,
        Codec::Alac,
        Codec::Opus,
    ];

    /// Maps a codec byte from the wire. Total: unmapped bytes give `Unknown`.
    #[must_use]
    pub fn from_wire(byte: u8) -> Self {
        match byte {
            b'a' => Codec::Aac,
            b'A' => Codec::Alac,
            b'm' => Codec::Mp3,
            b'f' => Codec::Flac,
            b'p' => Codec::Pcm,
            b'o' => Codec::Ogg,
            b'u' => Codec::Opus,
            _ => Codec::Unknown,
        }
    }

    /// Wire byte for this codec (`?` for `Unknown`).
    #[must_use]
    pub fn wire_byte(self) -> u8 {
        match self {
            Codec::Aac => b'a',
            Codec::Alac => b'A',
            Codec::Mp3 => b'm',
            Codec::Flac => b'f',
            Codec::Pcm => b'p',
            Codec::Ogg => b'o',
            Codec::Opus => b'u',
            Codec::Unknown => b'?',
        }
    }

    /// Short name used in the `HELO` capability string.
    #[must_use]
    pub fn capability_name(self) -> &'static str {
        match self {
            Codec::Aac => "aac",
            Codec::Alac => "alc",
            Codec::Mp3 => "mp3",
            Codec::Flac => "flc",
            Codec::Pcm => "pcm",
            Codec::Ogg => "ogg",
            Codec::Opus => "ops",
            Codec::Unknown => "",
        }
    }

    #[must_use]
    pub fn is_supported(self) -> bool {
        self != Codec::Unknown
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────────────────

/// State of the SlimProto connection.
///
/// Only the connection manager writes this; everyone else observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
    NetworkUnavailable,
}

impl ConnectionState {
    /// Whether a new connect attempt may start from this state.
    #[must_use]
    pub fn can_attempt_connection(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected
                | ConnectionState::Failed
                | ConnectionState::NetworkUnavailable
        )
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
            ConnectionState::NetworkUnavailable => "network_unavailable",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Why the connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectionReason {
    Unknown,
    NetworkLost,
    ServerError,
    Backgrounded,
    UserInitiated,
    Timeout,
}

impl DisconnectionReason {
    /// Whether the manager should schedule reconnect attempts on its own.
    #[must_use]
    pub fn allows_auto_reconnect(self) -> bool {
        !matches!(
            self,
            DisconnectionReason::Backgrounded | DisconnectionReason::UserInitiated
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport Commands
// ─────────────────────────────────────────────────────────────────────────────

/// Transport command from the host's lock-screen / media-control surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    TogglePlayPause,
    Next,
    Previous,
    Seek(f64),
}

impl RemoteCommand {
    /// Play/pause style commands trigger recovery when disconnected.
    #[must_use]
    pub fn is_play_pause(self) -> bool {
        matches!(
            self,
            RemoteCommand::Play | RemoteCommand::Pause | RemoteCommand::TogglePlayPause
        )
    }
}

/// Server-side preference for what happens to playback after a reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResumePreference {
    #[default]
    NoResume,
    ResumePlaying,
    ResumePlayingFromStart,
}

impl ResumePreference {
    /// Parses the numeric preference value stored by the server.
    #[must_use]
    pub fn from_pref_value(value: &str) -> Self {
        match value.trim() {
            "1" => ResumePreference::ResumePlaying,
            "2" => ResumePreference::ResumePlayingFromStart,
            _ => ResumePreference::NoResume,
        }
    }
}

/// Track metadata shown on the now-playing surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackInfo {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub artwork_url: Option<String>,
    pub duration: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_mapping_is_total() {
        for byte in 0..=u8::MAX {
            let codec = Codec::from_wire(byte);
            assert_eq!(codec, Codec::from_wire(byte));
            if codec.is_supported() {
                assert_eq!(codec.wire_byte(), byte);
            }
        }
    }

    #[test]
    fn only_idle_states_allow_connect() {
        assert!(ConnectionState::Disconnected.can_attempt_connection());
        assert!(ConnectionState::Failed.can_attempt_connection());
        assert!(ConnectionState::NetworkUnavailable.can_attempt_connection());
        assert!(!ConnectionState::Connecting.can_attempt_connection());
        assert!(!ConnectionState::Reconnecting.can_attempt_connection());
        assert!(!ConnectionState::Connected.can_attempt_connection());
    }

    #[test]
    fn user_and_background_disconnects_do_not_reconnect() {
        assert!(!DisconnectionReason::UserInitiated.allows_auto_reconnect());
        assert!(!DisconnectionReason::Backgrounded.allows_auto_reconnect());
        assert!(DisconnectionReason::NetworkLost.allows_auto_reconnect());
        assert!(DisconnectionReason::Timeout.allows_auto_reconnect());
    }

    #[test]
    fn resume_preference_parses_server_values() {
        assert_eq!(ResumePreference::from_pref_value("0"), ResumePreference::NoResume);
        assert_eq!(ResumePreference::from_pref_value("1"), ResumePreference::ResumePlaying);
        assert_eq!(
            ResumePreference::from_pref_value(" 2 "),
            ResumePreference::ResumePlayingFromStart
        );
        assert_eq!(ResumePreference::from_pref_value(""), ResumePreference::NoResume);
    }
}
