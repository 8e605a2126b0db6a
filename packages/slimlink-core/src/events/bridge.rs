//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between the core and
//! its observers (connectivity indicator, host UI, logging sinks).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, ConnectionEvent, PlaybackEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// Also forwards to an optional external emitter that can be set after
/// construction, for hosts that need direct delivery.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    /// Optional external emitter for host-specific event delivery
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    /// Returns a new receiver for the broadcast channel.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

/// Generates an [`EventEmitter`] method that forwards to the external emitter
/// (if set) and then sends to the broadcast channel.
macro_rules! impl_emit {
    ($method:ident, $event_ty:ty, $variant:ident) => {
        fn $method(&self, event: $event_ty) {
            if let Some(ref emitter) = *self.external_emitter.read() {
                emitter.$method(event.clone());
            }
            if let Err(e) = self.tx.send(BroadcastEvent::$variant(event)) {
                log::trace!("[EventBridge] No broadcast receivers: {}", e);
            }
        }
    };
}

impl EventEmitter for BroadcastEventBridge {
    impl_emit!(emit_connection, ConnectionEvent, Connection);
    impl_emit!(emit_playback, PlaybackEvent, Playback);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventEmitter;

    #[tokio::test]
    async fn subscribers_and_external_emitter_both_receive() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();
        let external = Arc::new(RecordingEventEmitter::default());
        bridge.set_external_emitter(external.clone());

        bridge.emit_playback(PlaybackEvent::PlaylistEnded { timestamp: 1 });

        match rx.recv().await.unwrap() {
            BroadcastEvent::Playback(PlaybackEvent::PlaylistEnded { timestamp }) => {
                assert_eq!(timestamp, 1)
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(external.playback.lock().len(), 1);
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        let bridge = BroadcastEventBridge::new(1);
        bridge.emit_connection(ConnectionEvent::ReconnectGaveUp {
            attempts: 3,
            timestamp: 0,
        });
    }
}
