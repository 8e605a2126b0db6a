//! Playback session state held by the dispatcher.
//!
//! Outlives individual connections: a reconnect does not reset it.

use std::time::Duration;

use tokio::time::Instant;

use crate::protocol_constants::{MANUAL_SKIP_WINDOW_SECS, START_REGRESSION_TOLERANCE_SECS};

/// What the player believes about the current stream.
#[derive(Debug, Clone, Default)]
pub struct PlaybackSessionState {
    pub is_stream_active: bool,
    pub is_paused: bool,
    /// Last local engine position recorded at an authoritative event (seconds).
    pub last_known_position: f64,
    /// When the server last set the reference position.
    pub server_reference_time: Option<Instant>,
    /// Position the server last commanded (start offset), in seconds.
    pub server_reference_position: f64,
    /// Set after `STMd`; the next status request means the playlist ended.
    pub waiting_for_next_track: bool,
    manual_skip_until: Option<Instant>,
}

/// Snapshot handed to the recovery coordinator on disconnect/background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub position: f64,
    pub is_stream_active: bool,
    pub is_paused: bool,
}

impl PlaybackSessionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a `strm start`.
    ///
    /// Returns the previous position when the new offset regresses more than
    /// the tolerance below it without a stop in between.
    pub fn start(&mut self, offset: f64, now: Instant) -> Option<f64> {
        let regressed = (self.is_stream_active
            && offset + START_REGRESSION_TOLERANCE_SECS < self.last_known_position)
            .then_some(self.last_known_position);

        self.is_stream_active = true;
        self.is_paused = false;
        self.waiting_for_next_track = false;
        self.server_reference_time = Some(now);
        self.server_reference_position = offset;
        self.last_known_position = offset;
        regressed
    }

    /// Refreshes the position of the running stream from a live source.
    pub fn observe_position(&mut self, position: f64) {
        if self.is_stream_active {
            self.last_known_position = position;
        }
    }

    pub fn mark_paused(&mut self, position: f64) {
        self.is_paused = true;
        self.last_known_position = position;
    }

    pub fn mark_resumed(&mut self) {
        self.is_paused = false;
    }

    /// Back to idle after stop, flush or a finished track.
    ///
    /// `waiting_for_next_track` is left alone: only a new start or the
    /// following status request clears it.
    pub fn reset_to_idle(&mut self) {
        self.is_stream_active = false;
        self.is_paused = false;
    }

    /// Opens the manual-skip window (user pressed next/previous).
    pub fn begin_manual_skip(&mut self, now: Instant) {
        self.manual_skip_until = Some(now + Duration::from_secs(MANUAL_SKIP_WINDOW_SECS));
    }

    #[must_use]
    pub fn manual_skip_in_progress(&self, now: Instant) -> bool {
        self.manual_skip_until.is_some_and(|until| now < until)
    }
}
