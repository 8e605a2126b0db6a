//! Authoritative playback time.
//!
//! The server's view of the position is sampled whenever something
//! authoritative happens (start, pause, unpause, status reply, a JSON-RPC
//! time query). Between samples the position is extrapolated while playing.

use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Sample {
    server_time: f64,
    playing: bool,
    sampled_at: Instant,
}

/// Single source of truth for playback time.
///
/// Shared as `Arc<TimeTracker>` between the dispatcher, the recovery
/// coordinator and the now-playing updates. Each update replaces the whole
/// sample so readers never observe a mixed state.
#[derive(Debug, Default)]
pub struct TimeTracker {
    sample: Mutex<Option<Sample>>,
}

impl TimeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an authoritative position.
    pub fn update(&self, server_time: f64, playing: bool) {
        *self.sample.lock() = Some(Sample {
            server_time: server_time.max(0.0),
            playing,
            sampled_at: Instant::now(),
        });
    }

    /// Current position: the sample if paused, sample plus elapsed if playing.
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.sample
            .lock()
            .map(|s| extrapolate(&s, Instant::now()))
            .unwrap_or(0.0)
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.sample.lock().map(|s| s.playing).unwrap_or(false)
    }

    /// Whether any authoritative sample has been recorded.
    #[must_use]
    pub fn has_sample(&self) -> bool {
        self.sample.lock().is_some()
    }
}

fn extrapolate(sample: &Sample, now: Instant) -> f64 {
    if sample.playing {
        sample.server_time + now.saturating_duration_since(sample.sampled_at).as_secs_f64()
    } else {
        sample.server_time
    }
}
