//! SlimLink Core - player side of the SlimProto protocol.
//!
//! This crate turns a local audio engine into a network player for a
//! SlimProto music server. The server drives playback over a persistent TCP
//! connection; the client executes its commands, reports status back, keeps
//! the connection alive across flaky mobile networks and restores the
//! playback position after a disconnect.
//!
//! # Architecture
//!
//! - [`protocol`]: frame codec and typed server commands
//! - [`dispatcher`]: executes commands against the audio engine
//! - [`connection`]: socket lifecycle, reconnection, health checks, background
//! - [`recovery`]: saves and restores the playback position
//! - [`control`]: JSON-RPC control channel to the server
//! - [`time_tracker`]: server-time extrapolation
//! - [`events`]: event system for observers
//! - [`bootstrap`]: composition root
//!
//! # Abstraction Traits
//!
//! The host plugs in through traits:
//!
//! - [`AudioEngine`](collaborators::AudioEngine): decoding and output
//! - [`NowPlayingSurface`](collaborators::NowPlayingSurface): lock-screen metadata
//! - [`BackgroundExecution`](lifecycle::BackgroundExecution): continued execution time
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//!
//! Each has a default suitable for a headless player.
//!
//! # Example
//!
//! ```ignore
//! let client = start_client(config, HostCollaborators::new(engine))?;
//! client.handle().connect().await?;
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod bootstrap;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod context;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod protocol;
pub mod protocol_constants;
pub mod recovery;
pub mod runtime;
pub mod session;
pub mod time_tracker;
pub mod types;
pub mod utils;

// Re-export commonly used types at the crate root
pub use bootstrap::{start_client, HostCollaborators, SlimClient};
pub use collaborators::{AudioEngine, FrameSink, NoopNowPlaying, NowPlayingSurface};
pub use config::{ClientConfig, ConfigError, PlayerIdentity, ReconnectConfig};
pub use connection::{ConnectionError, ConnectionHandle, LifecycleObserver};
pub use context::ServerContext;
pub use control::{ControlError, JsonRpcControl, ServerControl};
pub use error::{ErrorCode, SlimError, SlimResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, ConnectionEvent, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, PlaybackEvent,
};
pub use lifecycle::{BackgroundExecution, FixedBackgroundExecution, NoopBackgroundExecution};
pub use recovery::{RecoveryCoordinator, RecoveryFlow, SavedPosition};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use time_tracker::TimeTracker;
pub use types::{
    Codec, ConnectionState, DisconnectionReason, RemoteCommand, ResumePreference, TrackInfo,
};
pub use utils::{format_mac, now_millis, parse_mac};
