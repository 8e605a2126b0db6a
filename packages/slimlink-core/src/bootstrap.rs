//! Client bootstrap and dependency wiring.
//!
//! This module is the composition root: the one place where the control
//! channel, dispatcher, recovery coordinator and connection manager are
//! created and wired together.

use std::sync::Arc;

use reqwest::Client;
use tokio::task::JoinHandle;

use crate::collaborators::{AudioEngine, NoopNowPlaying, NowPlayingSurface};
use crate::config::ClientConfig;
use crate::connection::manager::{self, ManagerDeps};
use crate::connection::wire::WireWriter;
use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::context::ServerContext;
use crate::control::{ControlError, JsonRpcControl, ServerControl};
use crate::dispatcher::{CommandDispatcher, DispatcherDeps};
use crate::error::SlimResult;
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::lifecycle::{BackgroundExecution, NoopBackgroundExecution};
use crate::protocol_constants::EVENT_CHANNEL_CAPACITY;
use crate::recovery::{RecoveryCoordinator, RecoveryDeps};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::time_tracker::TimeTracker;

/// Host-provided collaborators.
#[derive(Clone)]
pub struct HostCollaborators {
    pub engine: Arc<dyn AudioEngine>,
    pub now_playing: Arc<dyn NowPlayingSurface>,
    pub background: Arc<dyn BackgroundExecution>,
    /// Overrides the JSON-RPC control channel.
    pub control: Option<Arc<dyn ServerControl>>,
}

impl HostCollaborators {
    /// Collaborators for a host that only provides an audio engine.
    #[must_use]
    pub fn new(engine: Arc<dyn AudioEngine>) -> Self {
        Self {
            engine,
            now_playing: Arc::new(NoopNowPlaying),
            background: Arc::new(NoopBackgroundExecution),
            control: None,
        }
    }
}

/// A running client.
pub struct SlimClient {
    handle: ConnectionHandle,
    events: Arc<BroadcastEventBridge>,
    recovery: RecoveryCoordinator,
    time: Arc<TimeTracker>,
    task: JoinHandle<()>,
}

impl SlimClient {
    /// Handle for connection requests and host notifications.
    #[must_use]
    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    /// Event bridge; subscribe to it or attach an external emitter.
    #[must_use]
    pub fn events(&self) -> &Arc<BroadcastEventBridge> {
        &self.events
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BroadcastEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn recovery(&self) -> &RecoveryCoordinator {
        &self.recovery
    }

    /// Playback time extrapolated from the last server sample (seconds).
    #[must_use]
    pub fn current_time(&self) -> f64 {
        self.time.current_time()
    }

    /// Sends `BYE!`, stops the manager and waits for it to finish.
    pub async fn shutdown(self) -> SlimResult<()> {
        log::info!("[Slim] Beginning graceful shutdown...");
        self.handle.shutdown().await?;
        if let Err(e) = self.task.await {
            log::warn!("[Slim] Manager task ended abnormally: {}", e);
        }
        log::info!("[Slim] Shutdown complete");
        Ok(())
    }
}

/// Creates the shared HTTP client for JSON-RPC requests.
///
/// Per-request timeouts are applied by the control channel.
fn create_http_client() -> Result<Client, ControlError> {
    Ok(Client::builder().build()?)
}

/// Validates `config`, wires every component and starts the manager.
///
/// Wiring order:
///
/// 1. Shared infrastructure (spawner, HTTP client, event bridge, time tracker)
/// 2. Control channel (depends on HTTP client and server context)
/// 3. Manager channel and handle
/// 4. Dispatcher (depends on engine, wire writer, control)
/// 5. Recovery coordinator (depends on control and the handle)
/// 6. Connection manager (owns the dispatcher, observed by recovery)
///
/// The client starts disconnected; call [`ConnectionHandle::connect`].
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the HTTP client
/// cannot be created.
pub fn start_client(config: ClientConfig, host: HostCollaborators) -> SlimResult<SlimClient> {
    config.validate()?;

    let spawner: Arc<dyn TaskSpawner> = Arc::new(TokioSpawner::current());
    let events = Arc::new(BroadcastEventBridge::new(EVENT_CHANNEL_CAPACITY));
    let emitter: Arc<dyn EventEmitter> = events.clone();
    let time = Arc::new(TimeTracker::new());
    let server = ServerContext::from_config(&config);

    let control: Arc<dyn ServerControl> = match host.control {
        Some(control) => control,
        None => Arc::new(JsonRpcControl::new(
            create_http_client()?,
            &server,
            config.identity.player_id(),
            config.rpc_timeout(),
        )),
    };

    let (handle, inbox) = manager::channel();
    let wire = Arc::new(WireWriter::new());

    let dispatcher = CommandDispatcher::new(
        DispatcherDeps {
            engine: host.engine,
            sink: wire.clone(),
            control: control.clone(),
            spawner: spawner.clone(),
            time: time.clone(),
            emitter: emitter.clone(),
            now_playing: host.now_playing,
        },
        server.clone(),
        config.player_name.clone(),
    );

    let recovery = RecoveryCoordinator::new(
        RecoveryDeps {
            control,
            time: time.clone(),
            emitter: emitter.clone(),
            spawner,
        },
        handle.clone(),
        config.connect_timeout(),
    );

    log::info!(
        "[Slim] Starting player {} ({}) for {}",
        config.player_name,
        config.identity.player_id(),
        server.slimproto_addr()
    );

    let mut connection = ConnectionManager::new(
        config,
        inbox,
        ManagerDeps {
            dispatcher,
            wire,
            background: host.background,
            emitter,
        },
    );
    connection.add_observer(Arc::new(recovery.clone()));
    let task = tokio::spawn(connection.run());

    Ok(SlimClient {
        handle,
        events,
        recovery,
        time,
        task,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fakes::FakeEngine;
    use crate::error::SlimError;
    use crate::types::ConnectionState;

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let config = ClientConfig {
            server_host: String::new(),
            ..Default::default()
        };
        let result = start_client(config, HostCollaborators::new(Arc::new(FakeEngine::default())));
        assert!(matches!(result, Err(SlimError::Configuration(_))));
    }

    #[tokio::test]
    async fn client_starts_disconnected_and_shuts_down() {
        let client = start_client(
            ClientConfig::default(),
            HostCollaborators::new(Arc::new(FakeEngine::default())),
        )
        .unwrap();
        assert_eq!(client.handle().state(), ConnectionState::Disconnected);

        let handle = client.handle().clone();
        client.shutdown().await.unwrap();
        assert!(matches!(handle.connect().await, Err(SlimError::Stopped)));
    }
}
