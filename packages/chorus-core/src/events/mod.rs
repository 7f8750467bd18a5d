//! Event system for notifying groups about session activity.
//!
//! This module provides:
//! - [`EventEmitter`] trait for sessions to emit events
//! - [`BroadcastEventBridge`] for fan-out to any number of subscribers
//! - Event types for playback and session lifecycle
//!
//! Events are informational: they are emitted after the session state has
//! changed, so an external notifier can tell the group what happened.

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

use serde::Serialize;

use crate::track::{GroupId, Track};

/// Events broadcast to subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events related to tracks and the queue.
    Playback(PlaybackEvent),

    /// Events related to session creation, connection and teardown.
    Session(SessionEvent),
}

/// Why a track stopped being the current track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The transport reported the natural end of the stream.
    Finished,
    /// A user skipped it.
    Skipped,
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// A user asked the session to leave.
    Left,
    /// The idle sweeper evicted it.
    IdleTimeout,
    /// The process is shutting down.
    Shutdown,
    /// Created by a command that failed and left nothing worth keeping.
    Abandoned,
}

impl CloseReason {
    /// Returns true if the service tore the session down on its own, so a
    /// command it interrupted may be replayed on a fresh session.
    pub fn is_eviction(self) -> bool {
        matches!(self, Self::IdleTimeout | Self::Abandoned)
    }
}

/// Events related to playback and the queue.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlaybackEvent {
    /// A track was added to the queue.
    TrackQueued {
        group: GroupId,
        track: Track,
        /// Zero-based queue position.
        position: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A track started streaming.
    TrackStarted {
        group: GroupId,
        track: Track,
        epoch: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The current track ended.
    TrackEnded {
        group: GroupId,
        #[serde(rename = "trackId")]
        track_id: String,
        reason: EndReason,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A track could not be started or failed mid-stream and was skipped.
    TrackFailed {
        group: GroupId,
        #[serde(rename = "trackId")]
        track_id: String,
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// An advance tried every queued entry and none could be played.
    QueueExhausted {
        group: GroupId,
        /// The last failure seen during the pass.
        error: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events related to session lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A session was created for a group.
    Created {
        group: GroupId,
        #[serde(rename = "sessionId")]
        session_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The transport acknowledged a connection.
    Connected {
        group: GroupId,
        target: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The transport dropped or failed fatally. The session stays registered
    /// so users can join again.
    ConnectionLost {
        group: GroupId,
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session left and its actor stopped.
    Closed {
        group: GroupId,
        reason: CloseReason,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<PlaybackEvent> for BroadcastEvent {
    fn from(event: PlaybackEvent) -> Self {
        BroadcastEvent::Playback(event)
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}
