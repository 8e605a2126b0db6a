//! Command dispatcher: executes server commands against the audio engine.
//!
//! The dispatcher is owned by the connection manager's event loop and is
//! only ever called from it, so it takes `&mut self` and holds the session
//! state directly. Replies go out through the [`FrameSink`] in the order the
//! commands arrived.

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::time::Instant;

use crate::collaborators::{AudioEngine, FrameSink, NowPlayingSurface};
use crate::context::ServerContext;
use crate::control::{ControlResult, ServerControl};
use crate::events::{EventEmitter, PlaybackEvent};
use crate::protocol::setd::encode_name_reply;
use crate::protocol::{
    InboundCommand, ProtocolMessage, SettingCommand, StatusCode, StatusReply, StatusTiming,
    StreamCommand, StreamSubCommand, VolumeCommand,
};
use crate::protocol_constants::TAG_STRM;
use crate::runtime::TaskSpawner;
use crate::session::{PlaybackSessionState, SessionSnapshot};
use crate::time_tracker::TimeTracker;
use crate::types::RemoteCommand;
use crate::utils::{jiffies, now_millis, split_elapsed};

/// Collaborators the dispatcher drives.
#[derive(Clone)]
pub struct DispatcherDeps {
    pub engine: Arc<dyn AudioEngine>,
    pub sink: Arc<dyn FrameSink>,
    pub control: Arc<dyn ServerControl>,
    pub spawner: Arc<dyn TaskSpawner>,
    pub time: Arc<TimeTracker>,
    pub emitter: Arc<dyn EventEmitter>,
    pub now_playing: Arc<dyn NowPlayingSurface>,
}

/// Executes inbound SlimProto commands and engine signals.
pub struct CommandDispatcher {
    deps: DispatcherDeps,
    server: ServerContext,
    player_name: String,
    volume: f32,
    backgrounded: bool,
    session: PlaybackSessionState,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(deps: DispatcherDeps, server: ServerContext, player_name: String) -> Self {
        Self {
            deps,
            server,
            player_name,
            volume: 1.0,
            backgrounded: false,
            session: PlaybackSessionState::new(),
        }
    }

    #[must_use]
    pub fn session(&self) -> &PlaybackSessionState {
        &self.session
    }

    #[must_use]
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    #[must_use]
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Suppresses `STMp` for pauses while the host is backgrounded.
    pub fn set_backgrounded(&mut self, backgrounded: bool) {
        self.backgrounded = backgrounded;
    }

    /// Position and flags for the recovery coordinator.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            position: self.current_position(),
            is_stream_active: self.session.is_stream_active,
            is_paused: self.session.is_paused,
        }
    }

    /// Handles one inbound message.
    pub fn process(&mut self, message: &ProtocolMessage) {
        let command = match InboundCommand::parse(message) {
            Ok(command) => command,
            Err(e) => {
                log::warn!("[Dispatcher] Malformed {}: {}", message.tag_str(), e);
                if message.tag() == TAG_STRM {
                    self.send_status(StatusCode::NotSupported);
                } else {
                    self.send_status(StatusCode::Heartbeat);
                }
                return;
            }
        };

        match command {
            InboundCommand::Stream(cmd) => self.handle_stream(cmd),
            InboundCommand::Volume(cmd) => self.handle_volume(cmd),
            InboundCommand::Setting(cmd) => self.handle_setting(cmd),
            InboundCommand::Acknowledge(_) => self.send_status(StatusCode::Heartbeat),
            InboundCommand::Display(_) => self.send_pause_aware_status(0),
            InboundCommand::Unknown(tag) => {
                log::debug!(
                    "[Dispatcher] Unhandled command {}",
                    String::from_utf8_lossy(&tag)
                );
                self.send_status(StatusCode::Heartbeat);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // strm
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_stream(&mut self, cmd: StreamCommand) {
        log::debug!("[Dispatcher] strm {:?}", cmd.sub_command);
        match cmd.sub_command {
            StreamSubCommand::Start => self.handle_start(&cmd),
            StreamSubCommand::Pause => self.handle_pause(),
            StreamSubCommand::Unpause => self.handle_unpause(),
            StreamSubCommand::Stop | StreamSubCommand::Flush => self.handle_stop(),
            StreamSubCommand::StatusRequest => self.handle_status_request(cmd.server_timestamp),
        }
    }

    fn handle_start(&mut self, cmd: &StreamCommand) {
        let Some(path) = cmd.request_path() else {
            self.report_anomaly("strm start without an HTTP request line".to_string());
            self.send_status(StatusCode::NotSupported);
            return;
        };
        if !cmd.codec.is_supported() {
            log::warn!("[Dispatcher] Rejecting start with unsupported codec");
            self.send_status(StatusCode::NotSupported);
            return;
        }

        self.send_status(StatusCode::FlushAck);

        if self.deps.time.has_sample() {
            self.session.observe_position(self.deps.time.current_time());
        }
        let offset = cmd.start_offset();
        if let Some(previous) = self.session.start(offset, Instant::now()) {
            self.report_anomaly(format!(
                "start offset {:.1}s regressed from {:.1}s without a stop",
                offset, previous
            ));
        }

        let url = self.server.stream_url(path, cmd.server_port);
        log::info!(
            "[Dispatcher] Starting {:?} stream at {:.1}s: {}",
            cmd.codec,
            offset,
            url
        );

        self.deps.engine.set_replay_gain(cmd.replay_gain);
        self.deps.engine.start_stream(&url, cmd.codec, offset);
        self.deps.time.update(offset, true);
        self.deps.now_playing.update_progress(offset, true);
        self.deps.emitter.emit_playback(PlaybackEvent::Started {
            url,
            codec: cmd.codec,
            offset,
            timestamp: now_millis(),
        });

        self.refresh_metadata();
    }

    fn handle_pause(&mut self) {
        let position = self.deps.engine.current_time();
        self.session.mark_paused(position);
        self.deps.engine.pause();
        self.deps.time.update(position, false);
        self.deps.now_playing.update_progress(position, false);

        if self.backgrounded {
            log::debug!("[Dispatcher] Paused in background, not reporting STMp");
        } else {
            self.send_status(StatusCode::Paused);
        }
        self.deps.emitter.emit_playback(PlaybackEvent::Paused {
            position,
            timestamp: now_millis(),
        });
    }

    fn handle_unpause(&mut self) {
        if !self.deps.engine.has_active_stream() {
            let offset = self.session.last_known_position;
            log::info!(
                "[Dispatcher] Unpause with no active stream, restarting current track at {:.1}s",
                offset
            );
            let control = self.deps.control.clone();
            self.spawn_control(
                "playlist_jump_to_current",
                Box::pin(async move { control.playlist_jump_to_current(offset).await }),
            );
            return;
        }

        self.session.mark_resumed();
        self.deps.engine.resume();
        let position = self.deps.engine.current_time();
        self.deps.time.update(position, true);
        self.deps.now_playing.update_progress(position, true);
        self.send_status(StatusCode::Resumed);
        self.deps.emitter.emit_playback(PlaybackEvent::Resumed {
            timestamp: now_millis(),
        });
    }

    fn handle_stop(&mut self) {
        let position = self.current_position();
        self.session.reset_to_idle();
        self.deps.engine.stop();
        self.deps.time.update(position, false);
        self.deps.now_playing.update_progress(position, false);
        self.send_status(StatusCode::FlushAck);
        self.deps.emitter.emit_playback(PlaybackEvent::Stopped {
            timestamp: now_millis(),
        });
    }

    fn handle_status_request(&mut self, server_timestamp: u32) {
        if self.session.waiting_for_next_track {
            log::info!("[Dispatcher] Status request after decoder ready: playlist ended");
            self.session.waiting_for_next_track = false;
            self.send_status_with(StatusCode::EndOfPlaylist, server_timestamp);
            self.deps.engine.stop();
            self.deps.emitter.emit_playback(PlaybackEvent::PlaylistEnded {
                timestamp: now_millis(),
            });
            return;
        }

        let position = self.current_position();
        if self.session.is_stream_active {
            self.session.last_known_position = position;
            let playing = !self.session.is_paused;
            self.deps.time.update(position, playing);
            self.deps.now_playing.update_progress(position, playing);
        }
        self.send_pause_aware_status(server_timestamp);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // audg / setd
    // ─────────────────────────────────────────────────────────────────────────

    fn handle_volume(&mut self, cmd: VolumeCommand) {
        let volume = cmd.normalized();
        log::debug!(
            "[Dispatcher] Volume {:.3} (raw {} / {})",
            volume,
            cmd.raw_left,
            cmd.raw_right
        );
        self.volume = volume;
        self.deps.engine.set_volume(volume);
        self.deps.emitter.emit_playback(PlaybackEvent::VolumeChanged {
            volume,
            timestamp: now_millis(),
        });
        self.send_status(StatusCode::Heartbeat);
    }

    fn handle_setting(&mut self, cmd: SettingCommand) {
        match cmd {
            SettingCommand::QueryName => {
                self.deps.sink.send_frame(encode_name_reply(&self.player_name));
            }
            SettingCommand::SetName(name) => {
                log::info!("[Dispatcher] Server renamed player to {:?}", name);
                self.player_name = name.clone();
                self.deps.sink.send_frame(encode_name_reply(&self.player_name));
                self.deps.emitter.emit_playback(PlaybackEvent::PlayerRenamed {
                    name,
                    timestamp: now_millis(),
                });
            }
            SettingCommand::Other(id) => {
                log::debug!("[Dispatcher] Ignoring setd id {}", id);
            }
        }
        self.send_status(StatusCode::Heartbeat);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Engine signals
    // ─────────────────────────────────────────────────────────────────────────

    /// The engine reached the end of the current track.
    pub fn notify_track_ended(&mut self) {
        if self.session.manual_skip_in_progress(Instant::now()) {
            log::debug!("[Dispatcher] Track end during manual skip, ignored");
            return;
        }
        if self.session.waiting_for_next_track {
            log::debug!("[Dispatcher] Track end while already waiting, ignored");
            return;
        }

        self.session.reset_to_idle();
        self.session.waiting_for_next_track = true;
        self.send_status(StatusCode::DecoderReady);
    }

    /// The engine connected to the stream URL.
    pub fn notify_stream_connected(&mut self) {
        self.send_status(StatusCode::ConnectedAck);
        self.send_status(StatusCode::PlaybackStarted);
    }

    /// The engine ran out of buffered audio.
    pub fn notify_stalled(&mut self) {
        log::warn!(
            "[Dispatcher] Playback stalled at {:.1}s",
            self.current_position()
        );
        self.deps.emitter.emit_playback(PlaybackEvent::Stalled {
            timestamp: now_millis(),
        });
    }

    /// Opens the window in which track-end signals are ignored.
    pub fn begin_manual_skip(&mut self) {
        self.session.begin_manual_skip(Instant::now());
    }

    /// Forwards a lock-screen command to the server while connected.
    pub fn handle_remote_command(&mut self, command: RemoteCommand) {
        let control = self.deps.control.clone();
        match command {
            RemoteCommand::Play => {
                self.spawn_control("play", Box::pin(async move { control.play().await }))
            }
            RemoteCommand::Pause => {
                self.spawn_control("pause", Box::pin(async move { control.pause().await }))
            }
            RemoteCommand::TogglePlayPause => {
                if self.session.is_paused || !self.session.is_stream_active {
                    self.spawn_control("play", Box::pin(async move { control.play().await }))
                } else {
                    self.spawn_control("pause", Box::pin(async move { control.pause().await }))
                }
            }
            RemoteCommand::Next | RemoteCommand::Previous => {
                let delta = if command == RemoteCommand::Next { 1 } else { -1 };
                self.begin_manual_skip();
                self.spawn_control(
                    "playlist_jump",
                    Box::pin(async move { control.playlist_jump(delta).await }),
                );
            }
            RemoteCommand::Seek(seconds) => {
                let playing = self.session.is_stream_active && !self.session.is_paused;
                self.deps.time.update(seconds, playing);
                self.deps.now_playing.update_progress(seconds, playing);
                self.spawn_control("seek", Box::pin(async move { control.seek(seconds).await }));
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn current_position(&self) -> f64 {
        if self.session.is_stream_active {
            self.deps.engine.current_time()
        } else {
            self.session.last_known_position
        }
    }

    fn send_pause_aware_status(&self, server_timestamp: u32) {
        let code = if self.session.is_paused {
            StatusCode::Paused
        } else {
            StatusCode::Heartbeat
        };
        self.send_status_with(code, server_timestamp);
    }

    fn send_status(&self, code: StatusCode) {
        self.send_status_with(code, 0);
    }

    fn send_status_with(&self, code: StatusCode, server_timestamp: u32) {
        let (elapsed_seconds, elapsed_millis) = split_elapsed(self.current_position());
        let reply = StatusReply::with_timing(
            code,
            StatusTiming {
                jiffies: jiffies(),
                elapsed_seconds,
                elapsed_millis,
                server_timestamp,
            },
        );
        log::trace!("[Dispatcher] -> STAT {:?}", code);
        self.send(reply.encode());
    }

    fn send(&self, frame: Bytes) {
        self.deps.sink.send_frame(frame);
    }

    fn report_anomaly(&self, description: String) {
        log::warn!("[Dispatcher] Server anomaly: {}", description);
        self.deps.emitter.emit_playback(PlaybackEvent::ServerAnomaly {
            description,
            timestamp: now_millis(),
        });
    }

    fn refresh_metadata(&self) {
        let control = self.deps.control.clone();
        let surface = self.deps.now_playing.clone();
        self.deps.spawner.spawn(Box::pin(async move {
            match control.now_playing().await {
                Ok(Some(track)) => surface.update_metadata(&track),
                Ok(None) => log::debug!("[Dispatcher] No metadata for current track"),
                Err(e) => log::warn!("[Dispatcher] Metadata refresh failed: {}", e),
            }
        }));
    }

    fn spawn_control(&self, action: &'static str, request: BoxFuture<'static, ControlResult<()>>) {
        self.deps.spawner.spawn(Box::pin(async move {
            if let Err(e) = request.await {
                log::warn!("[Dispatcher] {} failed: {}", action, e);
            }
        }));
    }
}
