//! Trait abstraction for server-side control operations.
//!
//! The dispatcher and the recovery coordinator depend on [`ServerControl`]
//! rather than on the HTTP client, so both can be tested with fakes.

use async_trait::async_trait;

use super::ControlResult;
use crate::types::{ResumePreference, TrackInfo};

/// Control operations performed against the server for this player.
#[async_trait]
pub trait ServerControl: Send + Sync {
    /// Starts or resumes playback of the current playlist.
    async fn play(&self) -> ControlResult<()>;

    /// Pauses playback.
    async fn pause(&self) -> ControlResult<()>;

    /// Stops playback.
    async fn stop(&self) -> ControlResult<()>;

    /// Seeks the current track.
    ///
    /// # Arguments
    /// * `seconds` - Absolute position within the track
    async fn seek(&self, seconds: f64) -> ControlResult<()>;

    /// Moves the playlist index relative to the current track.
    ///
    /// # Arguments
    /// * `delta` - `+1` for next, `-1` for previous
    async fn playlist_jump(&self, delta: i32) -> ControlResult<()>;

    /// Restarts the current playlist entry and seeks into it.
    ///
    /// Used when the server asks the player to unpause a stream the engine
    /// no longer holds: the server re-sends `strm start` for the same track.
    ///
    /// # Arguments
    /// * `offset` - Position to continue from, in seconds
    async fn playlist_jump_to_current(&self, offset: f64) -> ControlResult<()>;

    /// Authoritative playback position of the current track, in seconds.
    async fn current_time(&self) -> ControlResult<f64>;

    /// Server-side preference for resuming after a reconnect.
    async fn resume_preference(&self) -> ControlResult<ResumePreference>;

    /// Metadata of the current track, if any track is loaded.
    async fn now_playing(&self) -> ControlResult<Option<TrackInfo>>;
}
