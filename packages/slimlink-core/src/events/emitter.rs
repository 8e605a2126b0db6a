//! Event emitter abstraction for decoupling the core from transport.
//!
//! Components depend on the [`EventEmitter`] trait rather than concrete
//! broadcast channels, enabling testing and host-specific delivery.

use super::{ConnectionEvent, PlaybackEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// # Example
///
/// ```ignore
/// struct Dispatcher {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl Dispatcher {
///     fn on_stop(&self) {
///         self.emitter.emit_playback(PlaybackEvent::Stopped { timestamp: now_millis() });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a connection lifecycle event.
    fn emit_connection(&self, event: ConnectionEvent);

    /// Emits a playback event.
    fn emit_playback(&self, event: PlaybackEvent);
}

/// No-op emitter for hosts that do not observe events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_connection(&self, _event: ConnectionEvent) {}

    fn emit_playback(&self, _event: PlaybackEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_connection(&self, event: ConnectionEvent) {
        tracing::debug!(?event, "connection_event");
    }

    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }
}
