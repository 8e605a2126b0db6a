//! The connection manager event loop.
//!
//! Everything that touches connection state arrives here as a
//! [`ManagerEvent`]: host notifications, decoded frames, connect results
//! and fired timers. The loop handles one event at a time, so the state
//! machine has a single writer and needs no locks.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::handle::ConnectionHandle;
use super::policy::{NetworkConditions, ReconnectDecision, ReconnectPolicy};
use super::scheduler::{Scheduler, TimerFired, TimerKind};
use super::wire::{self, ReadEvent, WireWriter};
use super::{ConnectionError, LifecycleObserver};
use crate::collaborators::FrameSink;
use crate::config::ClientConfig;
use crate::context::ServerContext;
use crate::dispatcher::CommandDispatcher;
use crate::events::{ConnectionEvent, EventEmitter};
use crate::lifecycle::BackgroundExecution;
use crate::protocol::helo::{encode_bye, encode_helo};
use crate::protocol_constants::{
    BACKGROUND_EXPIRY_MARGIN_SECS, EVENT_QUEUE_CAPACITY, HEALTH_CHECK_BACKGROUND_SECS,
    HEALTH_CHECK_FOREGROUND_SECS, HEARTBEAT_TIMEOUT_SECS,
};
use crate::session::SessionSnapshot;
use crate::types::{ConnectionState, DisconnectionReason, RemoteCommand};
use crate::utils::now_millis;

/// How long shutdown waits for the writer to flush `BYE!`.
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Input to the event loop.
pub(crate) enum ManagerEvent {
    Connect,
    Disconnect,
    NetworkChanged { available: bool, expensive: bool },
    EnterBackground,
    EnterForeground,
    BecomeActive,
    TrackEnded,
    StreamConnected,
    Stalled,
    Remote(RemoteCommand),
    ConnectResult {
        generation: u64,
        result: Result<TcpStream, ConnectionError>,
    },
    Read {
        generation: u64,
        event: ReadEvent,
    },
    Timer(TimerFired),
    Shutdown(oneshot::Sender<()>),
}

/// Receiving side of the manager's queue, created with [`channel`].
pub struct ManagerInbox {
    tx: mpsc::Sender<ManagerEvent>,
    rx: mpsc::Receiver<ManagerEvent>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Creates the manager queue and the handle that feeds it.
///
/// The handle exists before the manager so that observers can hold one.
#[must_use]
pub fn channel() -> (ConnectionHandle, ManagerInbox) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    (
        ConnectionHandle::new(tx.clone(), state_rx),
        ManagerInbox { tx, rx, state_tx },
    )
}

/// Collaborators owned or shared by the manager.
pub struct ManagerDeps {
    pub dispatcher: CommandDispatcher,
    pub wire: Arc<WireWriter>,
    pub background: Arc<dyn BackgroundExecution>,
    pub emitter: Arc<dyn EventEmitter>,
}

struct ActiveSocket {
    reader_cancel: CancellationToken,
    writer: JoinHandle<()>,
}

/// Owns the SlimProto connection and its state machine.
pub struct ConnectionManager {
    config: ClientConfig,
    server: ServerContext,
    policy: ReconnectPolicy,
    dispatcher: CommandDispatcher,
    wire: Arc<WireWriter>,
    background: Arc<dyn BackgroundExecution>,
    emitter: Arc<dyn EventEmitter>,
    observers: Vec<Arc<dyn LifecycleObserver>>,

    tx: mpsc::Sender<ManagerEvent>,
    rx: mpsc::Receiver<ManagerEvent>,
    state_tx: watch::Sender<ConnectionState>,
    scheduler: Scheduler<ManagerEvent>,

    /// Bumped for every connect attempt and teardown; events tagged with an
    /// older generation are ignored.
    generation: u64,
    socket: Option<ActiveSocket>,
    failures: u32,
    last_inbound: Option<Instant>,

    is_background: bool,
    background_requested: bool,
    network_available: bool,
    network_expensive: bool,
    /// Reconnect once the network returns.
    resume_after_network: bool,
    /// Set by an explicit disconnect, cleared by an explicit connect.
    user_disconnected: bool,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: ClientConfig, inbox: ManagerInbox, deps: ManagerDeps) -> Self {
        let scheduler = Scheduler::new(inbox.tx.clone(), ManagerEvent::Timer);
        Self {
            server: ServerContext::from_config(&config),
            policy: ReconnectPolicy::new(config.reconnect.clone()),
            config,
            dispatcher: deps.dispatcher,
            wire: deps.wire,
            background: deps.background,
            emitter: deps.emitter,
            observers: Vec::new(),
            tx: inbox.tx,
            rx: inbox.rx,
            state_tx: inbox.state_tx,
            scheduler,
            generation: 0,
            socket: None,
            failures: 0,
            last_inbound: None,
            is_background: false,
            background_requested: false,
            network_available: true,
            network_expensive: false,
            resume_after_network: false,
            user_disconnected: false,
        }
    }

    /// Registers a lifecycle observer.
    pub fn add_observer(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    /// Runs the event loop until shutdown.
    pub async fn run(mut self) {
        log::info!("[Connection] Manager started for {}", self.server.slimproto_addr());
        while let Some(event) = self.rx.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        self.scheduler.cancel_all();
        log::info!("[Connection] Manager stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    async fn handle_event(&mut self, event: ManagerEvent) -> bool {
        match event {
            ManagerEvent::Connect => {
                self.user_disconnected = false;
                self.request_connect();
            }
            ManagerEvent::Disconnect => self.user_disconnect(),
            ManagerEvent::NetworkChanged {
                available,
                expensive,
            } => self.on_network_changed(available, expensive),
            ManagerEvent::EnterBackground => self.enter_background(),
            ManagerEvent::EnterForeground => self.enter_foreground(),
            ManagerEvent::BecomeActive => {
                if self.is_background {
                    log::debug!("[Connection] Became active while marked backgrounded");
                    self.enter_foreground();
                }
            }
            ManagerEvent::TrackEnded => self.dispatcher.notify_track_ended(),
            ManagerEvent::StreamConnected => self.dispatcher.notify_stream_connected(),
            ManagerEvent::Stalled => self.dispatcher.notify_stalled(),
            ManagerEvent::Remote(command) => self.on_remote_command(command),
            ManagerEvent::ConnectResult { generation, result } => {
                self.on_connect_result(generation, result)
            }
            ManagerEvent::Read { generation, event } => self.on_read(generation, event),
            ManagerEvent::Timer(fired) => {
                if self.scheduler.accept(fired) {
                    self.on_timer(fired.kind);
                }
            }
            ManagerEvent::Shutdown(ack) => {
                self.shutdown().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    // ─────────────────────────────────────────────────────────────────────────
    // State
    // ─────────────────────────────────────────────────────────────────────────

    fn set_state(&mut self, state: ConnectionState, reason: Option<DisconnectionReason>) {
        let previous = self.state_tx.send_replace(state);
        if previous == state {
            return;
        }
        match reason {
            Some(reason) => log::info!(
                "[Connection] {} -> {} ({:?})",
                previous,
                state,
                reason
            ),
            None => log::info!("[Connection] {} -> {}", previous, state),
        }
        self.emitter.emit_connection(ConnectionEvent::StateChanged {
            state,
            reason,
            timestamp: now_millis(),
        });
    }

    fn conditions(&self) -> NetworkConditions {
        NetworkConditions {
            background: self.is_background,
            expensive: self.network_expensive,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Connecting
    // ─────────────────────────────────────────────────────────────────────────

    fn request_connect(&mut self) {
        let state = self.state();
        if !state.can_attempt_connection() {
            log::debug!("[Connection] Connect ignored in state {}", state);
            return;
        }
        if !self.network_available {
            log::info!("[Connection] Network unavailable, will connect when it returns");
            self.resume_after_network = true;
            self.set_state(ConnectionState::NetworkUnavailable, None);
            return;
        }

        self.failures = 0;
        self.scheduler.cancel(TimerKind::Reconnect);
        self.set_state(ConnectionState::Connecting, None);
        self.start_attempt();
    }

    fn start_attempt(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        let addr = self.server.slimproto_addr();
        let timeout = self.config.connect_timeout();
        let tx = self.tx.clone();

        log::info!(
            "[Connection] Connecting to {} (failures so far: {})",
            addr,
            self.failures
        );
        tokio::spawn(async move {
            let result = wire::connect(&addr, timeout).await;
            let _ = tx
                .send(ManagerEvent::ConnectResult { generation, result })
                .await;
        });
    }

    fn on_connect_result(&mut self, generation: u64, result: Result<TcpStream, ConnectionError>) {
        let state = self.state();
        if generation != self.generation
            || !matches!(
                state,
                ConnectionState::Connecting | ConnectionState::Reconnecting
            )
        {
            log::debug!("[Connection] Discarding stale connect result");
            return;
        }

        match result {
            Ok(stream) => self.on_connected(stream),
            Err(e) => {
                log::warn!("[Connection] Connect failed: {}", e);
                self.failures += 1;
                self.schedule_reconnect(DisconnectionReason::ServerError);
            }
        }
    }

    fn on_connected(&mut self, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let writer = wire::spawn_writer(write_half, frame_rx);

        let cancel = CancellationToken::new();
        let tx = self.tx.clone();
        let generation = self.generation;
        wire::spawn_reader(read_half, cancel.clone(), move |event| {
            let tx = tx.clone();
            async move {
                tx.send(ManagerEvent::Read { generation, event })
                    .await
                    .is_ok()
            }
        });

        self.socket = Some(ActiveSocket {
            reader_cancel: cancel,
            writer,
        });
        self.wire.attach(frame_tx);
        self.wire.send_frame(encode_helo(&self.config.identity, 0));

        self.failures = 0;
        self.last_inbound = Some(Instant::now());
        self.set_state(ConnectionState::Connected, None);
        self.schedule_health_check();

        for observer in &self.observers {
            observer.on_connected();
        }
    }

    /// Starts the pending reconnect attempt without waiting out the backoff.
    ///
    /// No-op unless a reconnect timer is pending; an attempt already in
    /// flight is left to finish.
    fn reconnect_now(&mut self) {
        if self.state() != ConnectionState::Reconnecting
            || !self.scheduler.is_pending(TimerKind::Reconnect)
        {
            return;
        }
        log::info!("[Connection] Skipping reconnect backoff");
        self.scheduler.cancel(TimerKind::Reconnect);
        self.start_attempt();
    }

    fn schedule_reconnect(&mut self, reason: DisconnectionReason) {
        match self.policy.decide(self.failures, self.conditions()) {
            ReconnectDecision::Retry { attempt, delay } => {
                log::info!(
                    "[Connection] Reconnect attempt {} in {:.1}s",
                    attempt,
                    delay.as_secs_f64()
                );
                self.set_state(ConnectionState::Reconnecting, Some(reason));
                self.scheduler.schedule(TimerKind::Reconnect, delay);
                self.emitter
                    .emit_connection(ConnectionEvent::ReconnectScheduled {
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        timestamp: now_millis(),
                    });
            }
            ReconnectDecision::GiveUp => {
                log::warn!(
                    "[Connection] Giving up after {} failures, waiting for manual connect",
                    self.failures
                );
                self.set_state(ConnectionState::Failed, Some(reason));
                self.emitter.emit_connection(ConnectionEvent::ReconnectGaveUp {
                    attempts: self.failures,
                    timestamp: now_millis(),
                });
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Established connection
    // ─────────────────────────────────────────────────────────────────────────

    fn on_read(&mut self, generation: u64, event: ReadEvent) {
        if generation != self.generation || self.socket.is_none() {
            return;
        }
        match event {
            ReadEvent::Frame(message) => {
                self.last_inbound = Some(Instant::now());
                log::trace!("[Connection] <- {}", message.tag_str());
                self.dispatcher.process(&message);
            }
            ReadEvent::Closed(err) => {
                match err {
                    Some(e) => log::warn!("[Connection] Socket error: {}", e),
                    None => log::warn!("[Connection] {}", ConnectionError::Closed),
                }
                self.connection_lost(DisconnectionReason::ServerError);
            }
        }
    }

    /// Tears down the socket. Returns the writer task when there was one.
    fn teardown(&mut self, send_bye: bool) -> Option<JoinHandle<()>> {
        self.generation += 1;
        self.scheduler.cancel(TimerKind::HealthCheck);
        let socket = self.socket.take()?;
        socket.reader_cancel.cancel();
        if send_bye {
            self.wire.send_frame(encode_bye());
        }
        self.wire.detach();
        Some(socket.writer)
    }

    /// Tears down an established connection and notifies observers.
    fn drop_connection(
        &mut self,
        reason: DisconnectionReason,
        send_bye: bool,
    ) -> Option<JoinHandle<()>> {
        let was_connected = self.socket.is_some();
        let snapshot = self.dispatcher.snapshot();
        let writer = self.teardown(send_bye);
        if was_connected {
            self.notify_disconnected(snapshot, reason);
        }
        writer
    }

    fn notify_disconnected(&self, snapshot: SessionSnapshot, reason: DisconnectionReason) {
        for observer in &self.observers {
            observer.on_disconnected(snapshot, reason);
        }
    }

    fn connection_lost(&mut self, reason: DisconnectionReason) {
        self.drop_connection(reason, false);

        if !self.network_available {
            self.resume_after_network = true;
            self.set_state(
                ConnectionState::NetworkUnavailable,
                Some(DisconnectionReason::NetworkLost),
            );
            return;
        }
        if reason.allows_auto_reconnect() && !self.user_disconnected {
            self.failures = 1;
            self.schedule_reconnect(reason);
        } else {
            self.set_state(ConnectionState::Disconnected, Some(reason));
        }
    }

    fn user_disconnect(&mut self) {
        log::info!("[Connection] Disconnect requested");
        self.user_disconnected = true;
        self.resume_after_network = false;
        self.scheduler.cancel(TimerKind::Reconnect);
        self.drop_connection(DisconnectionReason::UserInitiated, true);
        self.set_state(
            ConnectionState::Disconnected,
            Some(DisconnectionReason::UserInitiated),
        );
    }

    async fn shutdown(&mut self) {
        log::info!("[Connection] Shutting down");
        self.scheduler.cancel_all();
        self.end_background();
        let writer = self.drop_connection(DisconnectionReason::UserInitiated, true);
        self.set_state(
            ConnectionState::Disconnected,
            Some(DisconnectionReason::UserInitiated),
        );
        if let Some(writer) = writer {
            if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, writer)
                .await
                .is_err()
            {
                log::warn!("[Connection] Writer did not flush before shutdown");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timers
    // ─────────────────────────────────────────────────────────────────────────

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::Reconnect => {
                if self.state() != ConnectionState::Reconnecting {
                    return;
                }
                if !self.network_available {
                    self.resume_after_network = true;
                    self.set_state(ConnectionState::NetworkUnavailable, None);
                    return;
                }
                self.start_attempt();
            }
            TimerKind::HealthCheck => self.check_health(),
            TimerKind::BackgroundExpiry => self.background_expired(),
        }
    }

    fn schedule_health_check(&mut self) {
        let period = if self.is_background {
            HEALTH_CHECK_BACKGROUND_SECS
        } else {
            HEALTH_CHECK_FOREGROUND_SECS
        };
        self.scheduler
            .schedule(TimerKind::HealthCheck, Duration::from_secs(period));
    }

    fn check_health(&mut self) {
        if self.state() != ConnectionState::Connected {
            return;
        }
        let now = Instant::now();
        let Some(last) = self.last_inbound else {
            self.schedule_health_check();
            return;
        };
        if !heartbeat_expired(last, now) {
            self.schedule_health_check();
            return;
        }

        let silent = now.saturating_duration_since(last);
        log::warn!(
            "[Connection] No traffic for {:.1}s, treating connection as dead",
            silent.as_secs_f64()
        );
        self.emitter.emit_connection(ConnectionEvent::HeartbeatTimeout {
            silent_for_ms: silent.as_millis() as u64,
            timestamp: now_millis(),
        });
        self.drop_connection(DisconnectionReason::Timeout, false);
        self.set_state(ConnectionState::Failed, Some(DisconnectionReason::Timeout));
        if self.network_available && !self.user_disconnected {
            self.failures = 1;
            self.schedule_reconnect(DisconnectionReason::Timeout);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host notifications
    // ─────────────────────────────────────────────────────────────────────────

    fn on_network_changed(&mut self, available: bool, expensive: bool) {
        self.network_expensive = expensive;

        if !available {
            if !self.network_available {
                return;
            }
            self.network_available = false;
            let state = self.state();
            self.resume_after_network |= matches!(
                state,
                ConnectionState::Connected
                    | ConnectionState::Connecting
                    | ConnectionState::Reconnecting
            );
            self.scheduler.cancel(TimerKind::Reconnect);
            if self.drop_connection(DisconnectionReason::NetworkLost, false).is_none() {
                // Invalidate any in-flight connect attempt.
                self.generation += 1;
            }
            self.set_state(
                ConnectionState::NetworkUnavailable,
                Some(DisconnectionReason::NetworkLost),
            );
            return;
        }

        let was_available = self.network_available;
        self.network_available = true;
        if was_available || self.state() != ConnectionState::NetworkUnavailable {
            return;
        }

        if self.resume_after_network && !self.user_disconnected {
            log::info!("[Connection] Network restored, reconnecting");
            self.resume_after_network = false;
            self.request_connect();
        } else {
            self.set_state(ConnectionState::Disconnected, None);
        }
    }

    fn enter_background(&mut self) {
        if self.is_background {
            return;
        }
        log::info!("[Connection] Entering background");
        self.is_background = true;
        self.dispatcher.set_backgrounded(true);

        let snapshot = self.dispatcher.snapshot();
        for observer in &self.observers {
            observer.on_enter_background(snapshot);
        }

        let granted = self.background.begin();
        self.background_requested = true;
        let countdown = background_countdown(granted, self.config.background_grace());
        log::debug!(
            "[Connection] Background countdown {:.1}s",
            countdown.as_secs_f64()
        );
        self.scheduler
            .schedule(TimerKind::BackgroundExpiry, countdown);

        if self.state() == ConnectionState::Connected {
            self.schedule_health_check();
        }
    }

    fn enter_foreground(&mut self) {
        log::info!("[Connection] Entering foreground");
        self.is_background = false;
        self.dispatcher.set_backgrounded(false);
        self.scheduler.cancel(TimerKind::BackgroundExpiry);
        self.end_background();

        let state = self.state();
        let reconnecting = !self.user_disconnected
            && match state {
                ConnectionState::Disconnected | ConnectionState::Failed => self.network_available,
                ConnectionState::Reconnecting => true,
                ConnectionState::NetworkUnavailable => self.resume_after_network,
                ConnectionState::Connecting | ConnectionState::Connected => false,
            };

        for observer in &self.observers {
            observer.on_enter_foreground(reconnecting);
        }

        match state {
            ConnectionState::Connected => self.schedule_health_check(),
            ConnectionState::Reconnecting => self.reconnect_now(),
            ConnectionState::Disconnected | ConnectionState::Failed if reconnecting => {
                self.request_connect()
            }
            _ => {}
        }
    }

    fn background_expired(&mut self) {
        log::info!("[Connection] Background time expired, disconnecting");
        self.scheduler.cancel(TimerKind::Reconnect);
        self.drop_connection(DisconnectionReason::Backgrounded, true);
        if self.state() != ConnectionState::NetworkUnavailable {
            self.set_state(
                ConnectionState::Disconnected,
                Some(DisconnectionReason::Backgrounded),
            );
        }
        self.end_background();
    }

    fn end_background(&mut self) {
        if self.background_requested {
            self.background_requested = false;
            self.background.end();
        }
    }

    fn on_remote_command(&mut self, command: RemoteCommand) {
        let state = self.state();
        if state == ConnectionState::Connected {
            self.dispatcher.handle_remote_command(command);
            return;
        }

        log::info!("[Connection] {:?} while {}", command, state);
        if command.is_play_pause() {
            self.reconnect_now();
        }
        let snapshot = self.dispatcher.snapshot();
        for observer in &self.observers {
            observer.on_remote_command_while_disconnected(command, snapshot);
        }
    }
}

/// Whether a connection silent since `last_inbound` should be declared dead.
fn heartbeat_expired(last_inbound: Instant, now: Instant) -> bool {
    now.saturating_duration_since(last_inbound) > Duration::from_secs(HEARTBEAT_TIMEOUT_SECS)
}

/// Countdown before a backgrounded client disconnects.
fn background_countdown(granted: Option<Duration>, default: Duration) -> Duration {
    granted
        .map(|g| g.saturating_sub(Duration::from_secs(BACKGROUND_EXPIRY_MARGIN_SECS)))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::{FakeControl, FakeEngine, RecordingSurface};
    use crate::dispatcher::DispatcherDeps;
    use crate::events::RecordingEventEmitter;
    use crate::lifecycle::NoopBackgroundExecution;
    use crate::runtime::TokioSpawner;
    use crate::time_tracker::TimeTracker;
    use parking_lot::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    #[derive(Default)]
    struct RecordingObserver {
        connected: Mutex<usize>,
        foreground: Mutex<Vec<bool>>,
        remote: Mutex<Vec<RemoteCommand>>,
    }

    impl LifecycleObserver for RecordingObserver {
        fn on_connected(&self) {
            *self.connected.lock() += 1;
        }

        fn on_disconnected(&self, _snapshot: SessionSnapshot, _reason: DisconnectionReason) {}

        fn on_enter_background(&self, _snapshot: SessionSnapshot) {}

        fn on_enter_foreground(&self, reconnecting: bool) {
            self.foreground.lock().push(reconnecting);
        }

        fn on_remote_command_while_disconnected(
            &self,
            command: RemoteCommand,
            _snapshot: SessionSnapshot,
        ) {
            self.remote.lock().push(command);
        }
    }

    struct Running {
        handle: ConnectionHandle,
        events: Arc<RecordingEventEmitter>,
        observer: Arc<RecordingObserver>,
    }

    impl Running {
        fn saw_state(&self, state: ConnectionState, reason: Option<DisconnectionReason>) -> bool {
            self.events.connection.lock().iter().any(|e| {
                matches!(e, ConnectionEvent::StateChanged { state: s, reason: r, .. }
                    if *s == state && *r == reason)
            })
        }
    }

    fn spawn_manager(config: ClientConfig) -> Running {
        let (handle, inbox) = channel();
        let wire = Arc::new(WireWriter::new());
        let events = Arc::new(RecordingEventEmitter::default());
        let observer = Arc::new(RecordingObserver::default());
        let deps = DispatcherDeps {
            engine: Arc::new(FakeEngine::default()),
            sink: wire.clone(),
            control: Arc::new(FakeControl::default()),
            spawner: Arc::new(TokioSpawner::current()),
            time: Arc::new(TimeTracker::new()),
            emitter: events.clone(),
            now_playing: Arc::new(RecordingSurface::default()),
        };
        let dispatcher = CommandDispatcher::new(
            deps,
            ServerContext::from_config(&config),
            config.player_name.clone(),
        );
        let mut manager = ConnectionManager::new(
            config,
            inbox,
            ManagerDeps {
                dispatcher,
                wire,
                background: Arc::new(NoopBackgroundExecution),
                emitter: events.clone(),
            },
        );
        manager.add_observer(observer.clone());
        tokio::spawn(manager.run());
        Running {
            handle,
            events,
            observer,
        }
    }

    fn config_for(listener: &TcpListener) -> ClientConfig {
        ClientConfig {
            slimproto_port: listener.local_addr().unwrap().port(),
            ..Default::default()
        }
    }

    /// Backoff long enough that any reconnect inside a test window was
    /// triggered by something other than the timer.
    fn with_slow_backoff(mut config: ClientConfig) -> ClientConfig {
        config.reconnect.base_delay_secs = 20.0;
        config
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn accept_within(listener: &TcpListener, limit: Duration) -> TcpStream {
        tokio::time::timeout(limit, listener.accept())
            .await
            .expect("no connection attempt in time")
            .unwrap()
            .0
    }

    async fn no_attempt_within(listener: &TcpListener, limit: Duration) -> bool {
        tokio::time::timeout(limit, listener.accept()).await.is_err()
    }

    async fn read_frame(socket: &mut TcpStream) -> ([u8; 4], Vec<u8>) {
        let mut header = [0u8; 8];
        socket.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let mut payload = vec![0u8; len];
        socket.read_exact(&mut payload).await.unwrap();
        ([header[0], header[1], header[2], header[3]], payload)
    }

    /// Connects and waits until the manager reports `Connected`.
    async fn establish(m: &Running, listener: &TcpListener) -> TcpStream {
        m.handle.connect().await.unwrap();
        let mut socket = accept_within(listener, WAIT).await;
        let (tag, _) = read_frame(&mut socket).await;
        assert_eq!(&tag, b"HELO");
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        socket
    }

    #[test]
    fn heartbeat_expires_after_thirty_seconds() {
        let last = Instant::now();
        assert!(!heartbeat_expired(last, last + Duration::from_secs(30)));
        assert!(heartbeat_expired(last, last + Duration::from_secs(31)));
    }

    #[test]
    fn background_countdown_keeps_margin() {
        let default = Duration::from_secs(25);
        assert_eq!(
            background_countdown(Some(Duration::from_secs(30)), default),
            Duration::from_secs(25)
        );
        assert_eq!(
            background_countdown(Some(Duration::from_secs(3)), default),
            Duration::ZERO
        );
        assert_eq!(background_countdown(None, default), default);
    }

    #[tokio::test]
    async fn connect_without_network_waits() {
        let m = spawn_manager(ClientConfig::default());
        m.handle.network_changed(false, false).await.unwrap();
        m.handle.connect().await.unwrap();

        assert!(
            m.handle
                .wait_for_state(ConnectionState::NetworkUnavailable, Duration::from_secs(1))
                .await
        );
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn refused_connect_schedules_reconnect() {
        let config = ClientConfig {
            slimproto_port: closed_port().await,
            ..Default::default()
        };
        let m = spawn_manager(config);
        m.handle.connect().await.unwrap();

        assert!(
            m.handle
                .wait_for_state(ConnectionState::Reconnecting, WAIT)
                .await
        );
        assert!(m
            .events
            .connection
            .lock()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::ReconnectScheduled { attempt: 1, .. })));

        // A second explicit connect is a no-op while reconnecting.
        m.handle.connect().await.unwrap();
        assert_eq!(m.handle.state(), ConnectionState::Reconnecting);

        m.handle.disconnect().await.unwrap();
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Disconnected, Duration::from_secs(1))
                .await
        );
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn metered_network_gives_up_quickly() {
        let mut config = ClientConfig {
            slimproto_port: closed_port().await,
            ..Default::default()
        };
        config.reconnect.max_expensive_failures = 1;
        let m = spawn_manager(config);
        m.handle.network_changed(true, true).await.unwrap();
        m.handle.connect().await.unwrap();

        assert!(m.handle.wait_for_state(ConnectionState::Failed, WAIT).await);
        assert!(m
            .events
            .connection
            .lock()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::ReconnectGaveUp { attempts: 1, .. })));
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn silent_server_fails_health_check_then_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let m = spawn_manager(config_for(&listener));
        m.handle.connect().await.unwrap();
        let _silent = accept_within(&listener, WAIT).await;

        // Health checks run at 15 s intervals; the third one sees 45 s of silence.
        let _second = accept_within(&listener, Duration::from_secs(120)).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);

        assert!(m
            .events
            .connection
            .lock()
            .iter()
            .any(|e| matches!(e, ConnectionEvent::HeartbeatTimeout { .. })));
        assert!(m.saw_state(ConnectionState::Failed, Some(DisconnectionReason::Timeout)));
        assert!(m.saw_state(
            ConnectionState::Reconnecting,
            Some(DisconnectionReason::Timeout)
        ));
        assert_eq!(*m.observer.connected.lock(), 2);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn background_expiry_says_bye_and_stays_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config_for(&listener);
        config.background_grace_secs = 1;
        let m = spawn_manager(config);
        let mut socket = establish(&m, &listener).await;

        m.handle.enter_background().await.unwrap();

        let (tag, payload) = tokio::time::timeout(WAIT, read_frame(&mut socket))
            .await
            .unwrap();
        assert_eq!(&tag, b"BYE!");
        assert_eq!(payload, vec![0]);
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Disconnected, WAIT)
                .await
        );
        assert!(m.saw_state(
            ConnectionState::Disconnected,
            Some(DisconnectionReason::Backgrounded)
        ));
        assert!(no_attempt_within(&listener, Duration::from_millis(500)).await);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn foreground_skips_reconnect_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let m = spawn_manager(with_slow_backoff(config_for(&listener)));
        let socket = establish(&m, &listener).await;

        m.handle.enter_background().await.unwrap();
        drop(socket);
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Reconnecting, WAIT)
                .await
        );

        m.handle.enter_foreground().await.unwrap();

        let _socket = accept_within(&listener, WAIT).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        assert_eq!(*m.observer.foreground.lock(), vec![true]);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn become_active_recovers_missed_foreground() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let m = spawn_manager(with_slow_backoff(config_for(&listener)));
        let socket = establish(&m, &listener).await;

        // Not backgrounded: nothing to recover.
        m.handle.become_active().await.unwrap();

        m.handle.enter_background().await.unwrap();
        drop(socket);
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Reconnecting, WAIT)
                .await
        );
        assert!(m.observer.foreground.lock().is_empty());

        m.handle.become_active().await.unwrap();

        let _socket = accept_within(&listener, WAIT).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        assert_eq!(*m.observer.foreground.lock(), vec![true]);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn network_restore_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let m = spawn_manager(config_for(&listener));
        let _socket = establish(&m, &listener).await;

        m.handle.network_changed(false, false).await.unwrap();
        assert!(
            m.handle
                .wait_for_state(ConnectionState::NetworkUnavailable, WAIT)
                .await
        );
        assert!(m.saw_state(
            ConnectionState::NetworkUnavailable,
            Some(DisconnectionReason::NetworkLost)
        ));

        m.handle.network_changed(true, false).await.unwrap();

        let _socket = accept_within(&listener, WAIT).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn user_disconnect_suppresses_auto_reconnect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = config_for(&listener);
        config.reconnect.base_delay_secs = 0.1;
        let m = spawn_manager(config);
        let mut socket = establish(&m, &listener).await;

        m.handle.disconnect().await.unwrap();
        let (tag, _) = read_frame(&mut socket).await;
        assert_eq!(&tag, b"BYE!");
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Disconnected, WAIT)
                .await
        );

        drop(socket);
        assert!(no_attempt_within(&listener, Duration::from_secs(1)).await);
        assert_eq!(m.handle.state(), ConnectionState::Disconnected);

        // An explicit connect lifts the suppression.
        m.handle.connect().await.unwrap();
        let _socket = accept_within(&listener, WAIT).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        m.handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn remote_play_skips_reconnect_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let m = spawn_manager(with_slow_backoff(config_for(&listener)));
        let socket = establish(&m, &listener).await;

        drop(socket);
        assert!(
            m.handle
                .wait_for_state(ConnectionState::Reconnecting, WAIT)
                .await
        );

        // Only play/pause moves the reconnect forward.
        m.handle.remote_command(RemoteCommand::Next).await.unwrap();
        assert!(no_attempt_within(&listener, Duration::from_millis(300)).await);

        m.handle.remote_command(RemoteCommand::Play).await.unwrap();

        let _socket = accept_within(&listener, WAIT).await;
        assert!(m.handle.wait_for_state(ConnectionState::Connected, WAIT).await);
        assert_eq!(
            *m.observer.remote.lock(),
            vec![RemoteCommand::Next, RemoteCommand::Play]
        );
        m.handle.shutdown().await.unwrap();
    }
}
