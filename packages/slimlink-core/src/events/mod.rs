//! Event system for observers of the client.
//!
//! This module provides:
//! - [`EventEmitter`] trait for the core to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for connection and playback domains

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::tests::RecordingEventEmitter;

use serde::Serialize;

use crate::types::{Codec, ConnectionState, DisconnectionReason};

/// Events broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events related to the SlimProto connection.
    Connection(ConnectionEvent),

    /// Events related to playback and the session.
    Playback(PlaybackEvent),
}

/// Events related to connection state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConnectionEvent {
    /// The connection state changed.
    StateChanged {
        state: ConnectionState,
        /// Set when the change was caused by a disconnect.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<DisconnectionReason>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A reconnect attempt was scheduled.
    ReconnectScheduled {
        attempt: u32,
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        timestamp: u64,
    },
    /// Automatic reconnection stopped; a manual connect is required.
    ReconnectGaveUp { attempts: u32, timestamp: u64 },
    /// No inbound traffic within the heartbeat timeout.
    HeartbeatTimeout {
        #[serde(rename = "silentForMs")]
        silent_for_ms: u64,
        timestamp: u64,
    },
}

/// Events related to playback.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// A stream was started on the audio engine.
    Started {
        url: String,
        codec: Codec,
        offset: f64,
        timestamp: u64,
    },
    Paused { position: f64, timestamp: u64 },
    Resumed { timestamp: u64 },
    Stopped { timestamp: u64 },
    /// The server had nothing queued after the last track.
    PlaylistEnded { timestamp: u64 },
    /// The audio engine reported a buffering stall.
    Stalled { timestamp: u64 },
    VolumeChanged { volume: f32, timestamp: u64 },
    PlayerRenamed { name: String, timestamp: u64 },
    /// The server sent something inconsistent; playback continued.
    ServerAnomaly { description: String, timestamp: u64 },
    /// A saved position was restored after reconnecting.
    PositionRecovered { position: f64, timestamp: u64 },
    /// A saved position was dropped as stale or inconsistent.
    PositionDiscarded { reason: String, timestamp: u64 },
}
