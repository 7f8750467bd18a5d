//! Audio transport capability.
//!
//! A transport is the external mechanism that actually streams audio to a
//! group's listeners (e.g. a voice channel connection). Sessions depend on
//! the [`TransportConnector`] and [`TransportHandle`] traits; the wire
//! protocol and the audio pipeline live behind them.
//!
//! Completion signals are delivered through a [`TransportEventSink`], which
//! feeds the owning session's inbox so they are ordered with user commands.

mod simulated;

pub use simulated::{SimulatedTransport, SimulatedTransportConfig};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::session::SessionMessage;
use crate::track::StreamHandle;

/// Errors reported by a transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The target does not name a reachable output (unknown channel, etc).
    #[error("invalid transport target: {0}")]
    InvalidTarget(String),

    /// The transport refused or failed to establish the connection.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The transport could not start streaming this particular source.
    #[error("source rejected: {0}")]
    SourceRejected(String),

    /// The connection is gone; nothing further can be streamed on it.
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}

impl TransportError {
    /// Returns true if the error ends the connection rather than one track.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }
}

/// Convenient Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Where a transport should connect (e.g. a voice channel id).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportTarget(pub String);

impl fmt::Display for TransportTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Out-of-band signals emitted by a connected transport.
///
/// Stream signals carry the epoch passed to [`TransportHandle::stream`] so the
/// session can discard signals that belong to a stream it already replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream for `epoch` reached its natural end.
    Finished { epoch: u64 },
    /// The stream for `epoch` failed mid-playback.
    Failed { epoch: u64, reason: String },
    /// The connection dropped unexpectedly.
    Disconnected { reason: String },
}

/// Delivers transport events into one session's inbox.
///
/// Each sink is bound to a single connection attempt; events from a
/// connection the session has since dropped are ignored.
#[derive(Clone)]
pub struct TransportEventSink {
    connection: u64,
    tx: mpsc::UnboundedSender<SessionMessage>,
}

impl TransportEventSink {
    pub(crate) fn new(connection: u64, tx: mpsc::UnboundedSender<SessionMessage>) -> Self {
        Self { connection, tx }
    }

    /// Emits an event. Returns `false` if the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionMessage::Transport {
                connection: self.connection,
                event,
            })
            .is_ok()
    }

    /// Returns true once the owning session has shut down.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A connected audio output channel.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Starts streaming `source`, replacing whatever was streaming.
    ///
    /// Completion is reported later as [`TransportEvent::Finished`] or
    /// [`TransportEvent::Failed`] tagged with `epoch`.
    async fn stream(&self, source: &StreamHandle, epoch: u64) -> TransportResult<()>;

    async fn pause(&self) -> TransportResult<()>;

    async fn resume(&self) -> TransportResult<()>;

    /// Stops the current stream without emitting `Finished` for it.
    async fn stop(&self) -> TransportResult<()>;

    /// Sets output volume (0-100).
    async fn set_volume(&self, volume: u8) -> TransportResult<()>;

    /// Releases the connection. Called at most once per handle.
    async fn disconnect(&self);
}

/// Opens transport connections.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Connects to `target` and resolves once the transport acknowledges.
    ///
    /// The caller bounds the wait with its own timeout.
    async fn connect(
        &self,
        target: &TransportTarget,
        events: TransportEventSink,
    ) -> TransportResult<Box<dyn TransportHandle>>;
}
