//! Position recovery across connection loss.
//!
//! When the connection drops mid-stream, or the app is backgrounded while
//! paused, the current position is saved. After reconnecting, the
//! coordinator checks the save against the server's own idea of the
//! playback time and restores it through the JSON-RPC control channel:
//!
//! - app reopen (reconnect after returning to the foreground):
//!   play, seek, pause
//! - remote command (lock-screen play/pause while disconnected):
//!   reconnect, play, seek
//!
//! The server-side resume preference adjusts both flows.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;

use crate::connection::{ConnectionHandle, LifecycleObserver};
use crate::control::ServerControl;
use crate::events::{EventEmitter, PlaybackEvent};
use crate::protocol_constants::{SAVED_POSITION_MAX_AGE_SECS, SAVED_POSITION_MAX_DRIFT_SECS};
use crate::runtime::TaskSpawner;
use crate::session::SessionSnapshot;
use crate::time_tracker::TimeTracker;
use crate::types::{ConnectionState, DisconnectionReason, RemoteCommand, ResumePreference};
use crate::utils::now_millis;

// ─────────────────────────────────────────────────────────────────────────────
// Saved position
// ─────────────────────────────────────────────────────────────────────────────

/// Why a saved position was not trusted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SaveRejection {
    #[error("saved {age_secs:.0}s ago")]
    Stale { age_secs: f64 },

    #[error("saved {saved:.1}s but server reports {authoritative:.1}s")]
    Drifted { saved: f64, authoritative: f64 },

    #[error("save was invalidated")]
    Invalidated,
}

/// Playback position captured when the connection went away.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedPosition {
    pub seconds: f64,
    pub saved_at: Instant,
    pub valid: bool,
}

impl SavedPosition {
    #[must_use]
    pub fn new(seconds: f64, saved_at: Instant) -> Self {
        Self {
            seconds,
            saved_at,
            valid: true,
        }
    }

    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.saved_at)
            < Duration::from_secs(SAVED_POSITION_MAX_AGE_SECS)
    }

    /// Returns the position to restore, or why the save cannot be trusted.
    ///
    /// `authoritative` is the server's current time for the player, when it
    /// could be fetched.
    pub fn validate(&self, authoritative: Option<f64>, now: Instant) -> Result<f64, SaveRejection> {
        if !self.valid {
            return Err(SaveRejection::Invalidated);
        }
        if !self.is_fresh(now) {
            return Err(SaveRejection::Stale {
                age_secs: now.saturating_duration_since(self.saved_at).as_secs_f64(),
            });
        }
        if let Some(server) = authoritative {
            if (server - self.seconds).abs() > SAVED_POSITION_MAX_DRIFT_SECS {
                return Err(SaveRejection::Drifted {
                    saved: self.seconds,
                    authoritative: server,
                });
            }
        }
        Ok(self.seconds)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────────────────

/// Which recovery sequence to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryFlow {
    /// Reconnected after the app came back to the foreground.
    AppReopen,
    /// A lock-screen play/pause arrived while disconnected.
    RemoteCommand,
}

/// Collaborators used by the coordinator.
#[derive(Clone)]
pub struct RecoveryDeps {
    pub control: Arc<dyn ServerControl>,
    pub time: Arc<TimeTracker>,
    pub emitter: Arc<dyn EventEmitter>,
    pub spawner: Arc<dyn TaskSpawner>,
}

#[derive(Default)]
struct RecoveryState {
    saved: Option<SavedPosition>,
    pending_reopen: bool,
    remote_in_flight: bool,
}

struct Inner {
    deps: RecoveryDeps,
    handle: ConnectionHandle,
    connect_timeout: Duration,
    state: Mutex<RecoveryState>,
}

/// Saves the playback position on disconnect and restores it on reconnect.
///
/// Registered with the connection manager as a [`LifecycleObserver`].
#[derive(Clone)]
pub struct RecoveryCoordinator {
    inner: Arc<Inner>,
}

impl RecoveryCoordinator {
    #[must_use]
    pub fn new(deps: RecoveryDeps, handle: ConnectionHandle, connect_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                deps,
                handle,
                connect_timeout,
                state: Mutex::new(RecoveryState::default()),
            }),
        }
    }

    /// The position currently held for recovery.
    #[must_use]
    pub fn saved_position(&self) -> Option<SavedPosition> {
        self.inner.state.lock().saved
    }

    /// Marks the held position as untrustworthy without dropping it.
    pub fn invalidate(&self) {
        if let Some(saved) = self.inner.state.lock().saved.as_mut() {
            saved.valid = false;
        }
    }

    /// Runs a recovery flow now. Returns the restored position, if any.
    pub async fn recover(&self, flow: RecoveryFlow) -> Option<f64> {
        self.inner.recover(flow).await
    }

    fn save(&self, seconds: f64, why: &str) {
        log::info!("[Recovery] Saving position {:.1}s ({})", seconds, why);
        self.inner.state.lock().saved = Some(SavedPosition::new(seconds, Instant::now()));
    }
}

impl Inner {
    async fn recover(&self, flow: RecoveryFlow) -> Option<f64> {
        let saved = self.state.lock().saved.take()?;
        let control = &self.deps.control;

        let authoritative = match control.current_time().await {
            Ok(t) => {
                self.deps.time.update(t, self.deps.time.is_playing());
                Some(t)
            }
            Err(e) => {
                log::warn!("[Recovery] Could not fetch server time: {}", e);
                None
            }
        };

        let preference = control.resume_preference().await.unwrap_or_else(|e| {
            log::warn!("[Recovery] Could not fetch resume preference: {}", e);
            ResumePreference::default()
        });

        let position = match saved.validate(authoritative, Instant::now()) {
            Ok(position) => position,
            Err(rejection) => {
                log::info!("[Recovery] Discarding saved position: {}", rejection);
                self.deps.emitter.emit_playback(PlaybackEvent::PositionDiscarded {
                    reason: rejection.to_string(),
                    timestamp: now_millis(),
                });
                match authoritative.or_else(|| self.tracked_time()) {
                    Some(position) => position,
                    None => return self.resume_without_position(flow).await,
                }
            }
        };

        log::info!(
            "[Recovery] {:?} recovery to {:.1}s (preference {:?})",
            flow,
            position,
            preference
        );

        if let Err(e) = control.play().await {
            log::warn!("[Recovery] Play failed: {}", e);
        }
        if preference != ResumePreference::ResumePlayingFromStart {
            if let Err(e) = control.seek(position).await {
                log::warn!("[Recovery] Seek to {:.1}s failed, continuing: {}", position, e);
            }
        }
        if flow == RecoveryFlow::AppReopen && preference == ResumePreference::NoResume {
            if let Err(e) = control.pause().await {
                log::warn!("[Recovery] Pause failed: {}", e);
            }
        }

        self.deps.emitter.emit_playback(PlaybackEvent::PositionRecovered {
            position,
            timestamp: now_millis(),
        });
        Some(position)
    }

    /// Last tracked server time. None until a sample was recorded.
    fn tracked_time(&self) -> Option<f64> {
        self.deps
            .time
            .has_sample()
            .then(|| self.deps.time.current_time())
    }

    /// No trustworthy position is known: never seek.
    ///
    /// A remote play still reaches the server; an app reopen leaves the
    /// server where it is.
    async fn resume_without_position(&self, flow: RecoveryFlow) -> Option<f64> {
        log::info!("[Recovery] No position to restore, not seeking");
        if flow == RecoveryFlow::RemoteCommand {
            if let Err(e) = self.deps.control.play().await {
                log::warn!("[Recovery] Play failed: {}", e);
            }
        }
        None
    }
}

impl LifecycleObserver for RecoveryCoordinator {
    fn on_connected(&self) {
        let reopen = std::mem::take(&mut self.inner.state.lock().pending_reopen);
        if !reopen {
            return;
        }
        let inner = self.inner.clone();
        self.inner.deps.spawner.spawn(Box::pin(async move {
            inner.recover(RecoveryFlow::AppReopen).await;
        }));
    }

    fn on_disconnected(&self, snapshot: SessionSnapshot, reason: DisconnectionReason) {
        if snapshot.is_stream_active {
            self.save(snapshot.position, &format!("disconnected: {:?}", reason));
        }
    }

    fn on_enter_background(&self, snapshot: SessionSnapshot) {
        if snapshot.is_stream_active && snapshot.is_paused {
            self.save(snapshot.position, "backgrounded while paused");
        }
    }

    fn on_enter_foreground(&self, reconnecting: bool) {
        let mut state = self.inner.state.lock();
        state.pending_reopen = reconnecting && state.saved.is_some();
    }

    fn on_remote_command_while_disconnected(
        &self,
        command: RemoteCommand,
        snapshot: SessionSnapshot,
    ) {
        if matches!(command, RemoteCommand::Next | RemoteCommand::Previous) {
            log::info!(
                "[Recovery] {:?} while disconnected, saved position no longer applies",
                command
            );
            self.invalidate();
            return;
        }
        if !command.is_play_pause() {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if state.remote_in_flight {
                log::debug!("[Recovery] {:?} ignored, recovery already running", command);
                return;
            }
            if state.saved.is_none() && snapshot.is_stream_active {
                state.saved = Some(SavedPosition::new(snapshot.position, Instant::now()));
            }
            state.remote_in_flight = true;
            // The remote flow supersedes an app-reopen recovery.
            state.pending_reopen = false;
        }

        let inner = self.inner.clone();
        self.inner.deps.spawner.spawn(Box::pin(async move {
            if let Err(e) = inner.handle.connect().await {
                log::warn!("[Recovery] Connect request failed: {}", e);
            } else if inner
                .handle
                .wait_for_state(ConnectionState::Connected, inner.connect_timeout)
                .await
            {
                inner.recover(RecoveryFlow::RemoteCommand).await;
            } else {
                log::info!("[Recovery] Not connected in time, keeping saved position");
            }
            inner.state.lock().remote_in_flight = false;
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeControl;
    use crate::connection::manager::{channel, ManagerInbox};
    use crate::events::RecordingEventEmitter;
    use crate::runtime::TokioSpawner;

    struct Harness {
        coordinator: RecoveryCoordinator,
        control: Arc<FakeControl>,
        time: Arc<TimeTracker>,
        events: Arc<RecordingEventEmitter>,
        _inbox: ManagerInbox,
    }

    fn harness(server_time: f64, preference: ResumePreference) -> Harness {
        let control = Arc::new(FakeControl::default());
        *control.server_time.lock() = server_time;
        *control.preference.lock() = preference;
        let time = Arc::new(TimeTracker::new());
        let events = Arc::new(RecordingEventEmitter::default());
        let (handle, inbox) = channel();
        let coordinator = RecoveryCoordinator::new(
            RecoveryDeps {
                control: control.clone(),
                time: time.clone(),
                emitter: events.clone(),
                spawner: Arc::new(TokioSpawner::current()),
            },
            handle,
            Duration::from_secs(1),
        );
        Harness {
            coordinator,
            control,
            time,
            events,
            _inbox: inbox,
        }
    }

    fn active(position: f64, paused: bool) -> SessionSnapshot {
        SessionSnapshot {
            position,
            is_stream_active: true,
            is_paused: paused,
        }
    }

    #[test]
    fn stale_save_always_rejected() {
        let saved_at = Instant::now();
        let save = SavedPosition::new(120.0, saved_at);
        let later = saved_at + Duration::from_secs(SAVED_POSITION_MAX_AGE_SECS);

        assert!(matches!(
            save.validate(Some(120.0), later),
            Err(SaveRejection::Stale { .. })
        ));
        assert!(matches!(
            save.validate(None, later + Duration::from_secs(3600)),
            Err(SaveRejection::Stale { .. })
        ));
    }

    #[test]
    fn save_checked_against_server_time() {
        let now = Instant::now();
        let save = SavedPosition::new(120.0, now);

        assert!(matches!(
            save.validate(Some(130.5), now),
            Err(SaveRejection::Drifted { .. })
        ));
        assert!(matches!(
            save.validate(Some(109.5), now),
            Err(SaveRejection::Drifted { .. })
        ));
        assert_eq!(save.validate(Some(125.0), now), Ok(120.0));
        assert_eq!(save.validate(Some(110.0), now), Ok(120.0));
        assert_eq!(save.validate(None, now), Ok(120.0));
    }

    #[test]
    fn invalidated_save_rejected() {
        let now = Instant::now();
        let mut save = SavedPosition::new(42.0, now);
        save.valid = false;
        assert_eq!(save.validate(Some(42.0), now), Err(SaveRejection::Invalidated));
    }

    #[tokio::test]
    async fn saves_only_when_stream_active() {
        let h = harness(0.0, ResumePreference::NoResume);
        h.coordinator.on_disconnected(
            SessionSnapshot {
                position: 10.0,
                is_stream_active: false,
                is_paused: false,
            },
            DisconnectionReason::ServerError,
        );
        assert!(h.coordinator.saved_position().is_none());

        h.coordinator.on_enter_background(active(30.0, false));
        assert!(h.coordinator.saved_position().is_none());

        h.coordinator.on_enter_background(active(30.0, true));
        assert_eq!(h.coordinator.saved_position().unwrap().seconds, 30.0);
    }

    #[tokio::test]
    async fn app_reopen_plays_seeks_and_pauses() {
        let h = harness(121.0, ResumePreference::NoResume);
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::NetworkLost);

        let restored = h.coordinator.recover(RecoveryFlow::AppReopen).await;

        assert_eq!(restored, Some(120.0));
        assert_eq!(h.control.calls(), vec!["play", "seek 120", "pause"]);
        assert!(h.coordinator.saved_position().is_none());
        assert!(h
            .events
            .playback
            .lock()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::PositionRecovered { position, .. } if *position == 120.0)));
    }

    #[tokio::test]
    async fn remote_flow_stays_playing() {
        let h = harness(118.0, ResumePreference::NoResume);
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::ServerError);

        h.coordinator.recover(RecoveryFlow::RemoteCommand).await;

        assert_eq!(h.control.calls(), vec!["play", "seek 120"]);
    }

    #[tokio::test]
    async fn drifted_save_falls_back_to_server_time() {
        let h = harness(200.0, ResumePreference::NoResume);
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::ServerError);

        let restored = h.coordinator.recover(RecoveryFlow::RemoteCommand).await;

        assert_eq!(restored, Some(200.0));
        assert_eq!(h.control.calls(), vec!["play", "seek 200"]);
        assert!(h
            .events
            .playback
            .lock()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::PositionDiscarded { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_save_without_server_time_never_seeks_to_zero() {
        let h = harness(0.0, ResumePreference::NoResume);
        *h.control.fail_time.lock() = true;
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::ServerError);
        tokio::time::advance(Duration::from_secs(SAVED_POSITION_MAX_AGE_SECS + 60)).await;

        let restored = h.coordinator.recover(RecoveryFlow::RemoteCommand).await;

        assert_eq!(restored, None);
        assert_eq!(h.control.calls(), vec!["play"]);
        assert!(h
            .events
            .playback
            .lock()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::PositionDiscarded { .. })));
        assert!(!h
            .events
            .playback
            .lock()
            .iter()
            .any(|e| matches!(e, PlaybackEvent::PositionRecovered { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn app_reopen_without_any_position_leaves_server_alone() {
        let h = harness(0.0, ResumePreference::NoResume);
        *h.control.fail_time.lock() = true;
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::Backgrounded);
        tokio::time::advance(Duration::from_secs(SAVED_POSITION_MAX_AGE_SECS + 60)).await;

        assert_eq!(h.coordinator.recover(RecoveryFlow::AppReopen).await, None);
        assert!(h.control.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_save_without_server_time_uses_tracked_time() {
        let h = harness(0.0, ResumePreference::NoResume);
        *h.control.fail_time.lock() = true;
        h.coordinator
            .on_disconnected(active(120.0, false), DisconnectionReason::ServerError);
        tokio::time::advance(Duration::from_secs(SAVED_POSITION_MAX_AGE_SECS + 60)).await;
        h.time.update(95.0, false);

        let restored = h.coordinator.recover(RecoveryFlow::AppReopen).await;

        assert_eq!(restored, Some(95.0));
        assert_eq!(h.control.calls(), vec!["play", "seek 95", "pause"]);
    }

    #[tokio::test]
    async fn skip_while_disconnected_invalidates_save() {
        let h = harness(80.0, ResumePreference::NoResume);
        h.coordinator
            .on_disconnected(active(40.0, false), DisconnectionReason::ServerError);

        h.coordinator
            .on_remote_command_while_disconnected(RemoteCommand::Next, active(40.0, false));

        let saved = h.coordinator.saved_position().unwrap();
        assert!(!saved.valid);
        assert!(h.control.calls().is_empty());

        let restored = h.coordinator.recover(RecoveryFlow::RemoteCommand).await;
        assert_eq!(restored, Some(80.0));
        assert_eq!(h.control.calls(), vec!["play", "seek 80"]);
        assert!(h.events.playback.lock().iter().any(|e| matches!(
            e,
            PlaybackEvent::PositionDiscarded { reason, .. } if reason.contains("invalidated")
        )));
    }

    #[tokio::test]
    async fn seek_failure_does_not_abort_flow() {
        let h = harness(60.0, ResumePreference::NoResume);
        *h.control.fail_seek.lock() = true;
        h.coordinator
            .on_disconnected(active(60.0, false), DisconnectionReason::Timeout);

        let restored = h.coordinator.recover(RecoveryFlow::AppReopen).await;

        assert_eq!(restored, Some(60.0));
        assert_eq!(h.control.calls(), vec!["play", "seek 60", "pause"]);
    }

    #[tokio::test]
    async fn resume_preferences_shape_the_flow() {
        let h = harness(50.0, ResumePreference::ResumePlaying);
        h.coordinator
            .on_disconnected(active(50.0, false), DisconnectionReason::ServerError);
        h.coordinator.recover(RecoveryFlow::AppReopen).await;
        assert_eq!(h.control.calls(), vec!["play", "seek 50"]);

        let h = harness(50.0, ResumePreference::ResumePlayingFromStart);
        h.coordinator
            .on_disconnected(active(50.0, false), DisconnectionReason::ServerError);
        h.coordinator.recover(RecoveryFlow::AppReopen).await;
        assert_eq!(h.control.calls(), vec!["play"]);
    }

    #[tokio::test]
    async fn nothing_to_recover_without_a_save() {
        let h = harness(10.0, ResumePreference::NoResume);
        assert_eq!(h.coordinator.recover(RecoveryFlow::AppReopen).await, None);
        assert!(h.control.calls().is_empty());
    }

    #[tokio::test]
    async fn foreground_reconnect_arms_app_reopen() {
        let h = harness(75.0, ResumePreference::NoResume);
        h.coordinator
            .on_disconnected(active(75.0, false), DisconnectionReason::Backgrounded);
        h.coordinator.on_enter_foreground(true);
        h.coordinator.on_connected();

        tokio::time::timeout(Duration::from_secs(1), async {
            while h.control.calls().len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.control.calls(), vec!["play", "seek 75", "pause"]);

        // A later reconnect does not replay the flow.
        h.coordinator.on_connected();
        tokio::task::yield_now().await;
        assert_eq!(h.control.calls().len(), 3);
    }
}
