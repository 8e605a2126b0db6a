//! Interfaces to the host's audio engine, now-playing surface and wire.
//!
//! The core never decodes audio or draws UI. It drives these traits, which
//! the host implements and injects at construction.

use bytes::Bytes;

use crate::types::{Codec, TrackInfo};

/// Local audio playback engine.
///
/// Calls are expected to return quickly; the engine does its own buffering
/// on its own threads. Engine-originated signals (stream connected, track
/// ended, stalled) flow back through the client handle.
pub trait AudioEngine: Send + Sync {
    /// Starts fetching and playing `url` from `offset` seconds.
    fn start_stream(&self, url: &str, codec: Codec, offset: f64);

    fn pause(&self);

    fn resume(&self);

    fn stop(&self);

    /// Playback position of the current stream, in seconds.
    fn current_time(&self) -> f64;

    /// Whether a stream is loaded (playing or paused).
    fn has_active_stream(&self) -> bool;

    /// Output volume in `[0.0, 1.0]`.
    fn set_volume(&self, volume: f32);

    /// Replay gain multiplier for the current stream.
    fn set_replay_gain(&self, gain: f32);
}

/// Host lock-screen / media-control surface.
pub trait NowPlayingSurface: Send + Sync {
    fn update_metadata(&self, track: &TrackInfo);

    fn update_progress(&self, current_time: f64, is_playing: bool);
}

/// Surface for hosts without one.
pub struct NoopNowPlaying;

impl NowPlayingSurface for NoopNowPlaying {
    fn update_metadata(&self, _track: &TrackInfo) {}

    fn update_progress(&self, _current_time: f64, _is_playing: bool) {}
}

/// Outbound side of the SlimProto connection.
///
/// Frames are queued in call order. When no connection is up, frames are
/// dropped.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: Bytes);
}
