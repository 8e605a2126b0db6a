//! Connection lifecycle: socket ownership, reconnection, health, background.
//!
//! - [`manager`]: the event loop that owns the connection state
//! - [`handle`]: cloneable front door used by the host
//! - [`policy`]: reconnection backoff
//! - [`scheduler`]: cancellable timers posting back to the loop
//! - [`wire`]: socket reader/writer tasks

pub mod handle;
pub mod manager;
pub mod policy;
pub mod scheduler;
pub mod wire;

use thiserror::Error;

pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
pub use policy::{NetworkConditions, ReconnectDecision, ReconnectPolicy};

use crate::session::SessionSnapshot;
use crate::types::{DisconnectionReason, RemoteCommand};

/// Errors on the SlimProto socket.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connect timed out")]
    Timeout,

    #[error("connection closed by server")]
    Closed,
}

/// Receives lifecycle callbacks from the connection manager.
///
/// Called on the manager's event loop: implementations must not block and
/// should spawn any async work.
pub trait LifecycleObserver: Send + Sync {
    /// A connection was established.
    fn on_connected(&self);

    /// An established connection went away.
    fn on_disconnected(&self, snapshot: SessionSnapshot, reason: DisconnectionReason);

    /// The host moved the app to the background.
    fn on_enter_background(&self, snapshot: SessionSnapshot);

    /// The host brought the app back. `reconnecting` is true when the
    /// connection was lost meanwhile and the manager is reconnecting, now or
    /// once the network returns.
    fn on_enter_foreground(&self, reconnecting: bool);

    /// A transport command arrived while not connected. For play/pause the
    /// manager has already moved any pending reconnect forward.
    fn on_remote_command_while_disconnected(
        &self,
        _command: RemoteCommand,
        _snapshot: SessionSnapshot,
    ) {
    }
}
