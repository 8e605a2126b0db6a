//! Simulated audio engine.
//!
//! Does not decode anything: it logs what the server asks for and advances a
//! clock-driven position. Stream-connected and track-end signals go back to
//! the client through [`forward_signals`], so the server sees the same
//! `STMc`/`STMs`/`STMd` sequence a real player would send and advances its
//! playlist.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use slimlink_core::{AudioEngine, Codec, ConnectionHandle};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// How often a playing stream checks whether it reached the end.
const END_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Engine notifications for the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineSignal {
    StreamConnected,
    TrackEnded,
}

#[derive(Debug, Default)]
struct Playback {
    url: Option<String>,
    /// Bumped on every start and stop; a track-end watcher exits once its
    /// stream is no longer current.
    generation: u64,
    /// Position when `since` was taken.
    position: f64,
    since: Option<Instant>,
}

impl Playback {
    fn position(&self) -> f64 {
        match self.since {
            Some(since) => self.position + since.elapsed().as_secs_f64(),
            None => self.position,
        }
    }
}

pub struct SimulatedEngine {
    state: Arc<Mutex<Playback>>,
    track_length: f64,
    signals: mpsc::UnboundedSender<EngineSignal>,
}

impl SimulatedEngine {
    /// Every stream is treated as `track_length` long.
    pub fn new(track_length: Duration, signals: mpsc::UnboundedSender<EngineSignal>) -> Self {
        Self {
            state: Arc::new(Mutex::new(Playback::default())),
            track_length: track_length.as_secs_f64(),
            signals,
        }
    }

    fn signal(&self, signal: EngineSignal) {
        if self.signals.send(signal).is_err() {
            log::debug!("[Engine] No listener for {:?}", signal);
        }
    }

    fn watch_for_end(&self, generation: u64) {
        let state = self.state.clone();
        let signals = self.signals.clone();
        let track_length = self.track_length;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(END_POLL_INTERVAL).await;
                {
                    let playback = state.lock();
                    if playback.generation != generation || playback.url.is_none() {
                        return;
                    }
                    if playback.position() < track_length {
                        continue;
                    }
                }
                log::info!("[Engine] Track finished");
                let _ = signals.send(EngineSignal::TrackEnded);
                return;
            }
        });
    }
}

impl AudioEngine for SimulatedEngine {
    fn start_stream(&self, url: &str, codec: Codec, offset: f64) {
        log::info!("[Engine] Streaming {:?} from {} at {:.1}s", codec, url, offset);
        let generation = {
            let mut state = self.state.lock();
            let generation = state.generation + 1;
            *state = Playback {
                url: Some(url.to_string()),
                generation,
                position: offset,
                since: Some(Instant::now()),
            };
            generation
        };
        self.signal(EngineSignal::StreamConnected);
        self.watch_for_end(generation);
    }

    fn pause(&self) {
        let mut state = self.state.lock();
        state.position = state.position();
        state.since = None;
        log::info!("[Engine] Paused at {:.1}s", state.position);
    }

    fn resume(&self) {
        let mut state = self.state.lock();
        if state.url.is_some() && state.since.is_none() {
            state.since = Some(Instant::now());
            log::info!("[Engine] Resumed at {:.1}s", state.position);
        }
    }

    fn stop(&self) {
        let mut state = self.state.lock();
        let position = state.position();
        *state = Playback {
            position,
            generation: state.generation + 1,
            ..Default::default()
        };
        log::info!("[Engine] Stopped");
    }

    fn current_time(&self) -> f64 {
        self.state.lock().position()
    }

    fn has_active_stream(&self) -> bool {
        self.state.lock().url.is_some()
    }

    fn set_volume(&self, volume: f32) {
        log::info!("[Engine] Volume {:.0}%", volume * 100.0);
    }

    fn set_replay_gain(&self, gain: f32) {
        log::debug!("[Engine] Replay gain {:.2}", gain);
    }
}

/// Relays engine signals to the connection manager until either side stops.
pub async fn forward_signals(
    mut signals: mpsc::UnboundedReceiver<EngineSignal>,
    handle: ConnectionHandle,
) {
    while let Some(signal) = signals.recv().await {
        let result = match signal {
            EngineSignal::StreamConnected => handle.stream_connected().await,
            EngineSignal::TrackEnded => handle.track_ended().await,
        };
        if let Err(e) = result {
            log::debug!("[Engine] Client stopped, dropping {:?}: {}", signal, e);
            return;
        }
    }
}
