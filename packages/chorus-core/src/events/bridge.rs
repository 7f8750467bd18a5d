//! Bridge implementation that maps domain events to a broadcast channel.
//!
//! The [`BroadcastEventBridge`] sits between the session actors and whatever
//! tells users what happened (a chat bot, a log tail, an HTTP client).

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::{BroadcastEvent, PlaybackEvent, SessionEvent};

/// Bridges domain events to a `tokio::sync::broadcast` channel.
///
/// The bridge also forwards to an optional external emitter that can be set
/// after construction, for embedders that want events pushed to them rather
/// than subscribing.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
    external_emitter: Arc<RwLock<Option<Arc<dyn EventEmitter>>>>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self::with_sender(tx)
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self {
            tx,
            external_emitter: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets an external emitter that receives every event before broadcast.
    pub fn set_external_emitter(&self, emitter: Arc<dyn EventEmitter>) {
        *self.external_emitter.write() = Some(emitter);
    }

    pub fn has_external_emitter(&self) -> bool {
        self.external_emitter.read().is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
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
    impl_emit!(emit_playback, PlaybackEvent, Playback);
    impl_emit!(emit_session, SessionEvent, Session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CloseReason;
    use crate::track::GroupId;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingEmitter {
        sessions: Mutex<Vec<SessionEvent>>,
    }

    impl EventEmitter for RecordingEmitter {
        fn emit_playback(&self, _event: PlaybackEvent) {}

        fn emit_session(&self, event: SessionEvent) {
            self.sessions.lock().push(event);
        }
    }

    fn closed() -> SessionEvent {
        SessionEvent::Closed {
            group: GroupId::from("g1"),
            reason: CloseReason::Left,
            timestamp: 1,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bridge = BroadcastEventBridge::new(8);
        let mut rx = bridge.subscribe();

        bridge.emit_session(closed());

        match rx.recv().await.unwrap() {
            BroadcastEvent::Session(SessionEvent::Closed { group, .. }) => {
                assert_eq!(group.as_str(), "g1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn emitting_without_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(8);
        bridge.emit_session(closed());
    }

    #[test]
    fn external_emitter_receives_copy() {
        let bridge = BroadcastEventBridge::new(8);
        let recorder = Arc::new(RecordingEmitter::default());
        bridge.set_external_emitter(recorder.clone());

        bridge.emit_session(closed());

        assert_eq!(recorder.sessions.lock().len(), 1);
    }
}
