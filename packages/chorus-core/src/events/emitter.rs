//! Event emitter abstraction for decoupling sessions from notification delivery.
//!
//! Sessions depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, so tests can observe events and embedders can forward them to a
//! chat bot or any other notifier.

use super::{PlaybackEvent, SessionEvent};

/// Trait for emitting domain events without knowledge of delivery.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn announce(&self, group: GroupId) {
///         self.emitter.emit_session(SessionEvent::Created { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a track or queue event.
    fn emit_playback(&self, event: PlaybackEvent);

    /// Emits a session lifecycle event.
    fn emit_session(&self, event: SessionEvent);
}

/// No-op emitter for embedders that do not consume events.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_playback(&self, _event: PlaybackEvent) {}

    fn emit_session(&self, _event: SessionEvent) {}
}

/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        tracing::debug!(?event, "playback_event");
    }

    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CloseReason;
    use crate::track::GroupId;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        playback_count: AtomicUsize,
        session_count: AtomicUsize,
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit_playback(&self, _event: PlaybackEvent) {
            self.playback_count.fetch_add(1, Ordering::SeqCst);
        }

        fn emit_session(&self, _event: SessionEvent) {
            self.session_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter {
            playback_count: AtomicUsize::new(0),
            session_count: AtomicUsize::new(0),
        });
        let dyn_emitter: Arc<dyn EventEmitter> = emitter.clone();

        dyn_emitter.emit_playback(PlaybackEvent::QueueExhausted {
            group: GroupId::from("g"),
            error: "gone".into(),
            timestamp: 0,
        });
        dyn_emitter.emit_session(SessionEvent::Closed {
            group: GroupId::from("g"),
            reason: CloseReason::Left,
            timestamp: 0,
        });
        LoggingEventEmitter.emit_session(SessionEvent::Closed {
            group: GroupId::from("g"),
            reason: CloseReason::Shutdown,
            timestamp: 0,
        });

        assert_eq!(emitter.playback_count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.session_count.load(Ordering::SeqCst), 1);
    }
}
