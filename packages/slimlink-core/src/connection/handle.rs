//! Cloneable front door to the connection manager.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};

use super::manager::ManagerEvent;
use crate::error::{SlimError, SlimResult};
use crate::types::{ConnectionState, RemoteCommand};

/// Sends host notifications to the manager and observes its state.
///
/// Every method only enqueues an event; the manager applies them in order.
#[derive(Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<ManagerEvent>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<ManagerEvent>,
        state_rx: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self { tx, state_rx }
    }

    async fn send(&self, event: ManagerEvent) -> SlimResult<()> {
        self.tx.send(event).await.map_err(|_| SlimError::Stopped)
    }

    /// Connects, resetting the failure count. No-op while a connection is
    /// established or already being attempted.
    pub async fn connect(&self) -> SlimResult<()> {
        self.send(ManagerEvent::Connect).await
    }

    /// Disconnects and suppresses automatic reconnection until the next
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) -> SlimResult<()> {
        self.send(ManagerEvent::Disconnect).await
    }

    /// Reports a change in network reachability or cost.
    pub async fn network_changed(&self, available: bool, expensive: bool) -> SlimResult<()> {
        self.send(ManagerEvent::NetworkChanged {
            available,
            expensive,
        })
        .await
    }

    pub async fn enter_background(&self) -> SlimResult<()> {
        self.send(ManagerEvent::EnterBackground).await
    }

    pub async fn enter_foreground(&self) -> SlimResult<()> {
        self.send(ManagerEvent::EnterForeground).await
    }

    /// The app became active. Recovers a missed foreground transition.
    pub async fn become_active(&self) -> SlimResult<()> {
        self.send(ManagerEvent::BecomeActive).await
    }

    /// The audio engine finished the current track.
    pub async fn track_ended(&self) -> SlimResult<()> {
        self.send(ManagerEvent::TrackEnded).await
    }

    /// The audio engine connected to the stream URL.
    pub async fn stream_connected(&self) -> SlimResult<()> {
        self.send(ManagerEvent::StreamConnected).await
    }

    /// The audio engine ran out of data.
    pub async fn stalled(&self) -> SlimResult<()> {
        self.send(ManagerEvent::Stalled).await
    }

    /// A transport command from the host's lock screen or headset.
    pub async fn remote_command(&self, command: RemoteCommand) -> SlimResult<()> {
        self.send(ManagerEvent::Remote(command)).await
    }

    /// Disconnects with `BYE!` and stops the manager. Resolves once the
    /// manager has finished.
    pub async fn shutdown(&self) -> SlimResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(ManagerEvent::Shutdown(ack_tx)).await?;
        ack_rx.await.map_err(|_| SlimError::Stopped)
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Waits until the manager reaches `target`. Returns false on timeout or
    /// if the manager stopped.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut rx = self.state_rx.clone();
        let reached = tokio::time::timeout(timeout, rx.wait_for(|state| *state == target))
            .await
            .map(|result| result.is_ok())
            .unwrap_or(false);
        reached
    }
}
