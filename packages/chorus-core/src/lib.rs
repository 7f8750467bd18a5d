//! Chorus Core - per-group playback sessions.
//!
//! This crate provides the session engine behind Chorus: every group (a chat
//! guild, a room, a party) gets one [`PlaybackSession`] that owns a track
//! queue and a connection to an audio transport. It is designed to be used by
//! both the standalone server and bots that embed the engine directly.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`track`] / [`queue`]: Track metadata and the ordered pending queue
//! - [`catalog`]: Resolving free-text queries to playable tracks
//! - [`transport`]: Connecting to a group's audio channel and streaming
//! - [`session`]: The per-group playback state machine
//! - [`services`]: Session registry, command service and idle sweeper
//! - [`events`]: Event system for real-time client communication
//! - [`api`]: HTTP command surface
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! The crate defines several traits to decouple session logic from concrete
//! backends:
//!
//! - [`CatalogProvider`](catalog::CatalogProvider): Searching and resolving tracks
//! - [`TransportConnector`](transport::TransportConnector): Opening transport connections
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//!
//! Each trait has an in-process implementation suitable for the standalone
//! server. Bots provide implementations backed by their platform.

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod queue;
pub mod runtime;
pub mod services;
pub mod session;
pub mod track;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types at the crate root
pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, CloseReason, EndReason, EventEmitter,
    LoggingEventEmitter, NoopEventEmitter, PlaybackEvent, SessionEvent,
};
pub use queue::TrackQueue;
pub use runtime::{TaskSpawner, TokioSpawner};
pub use track::{GroupId, SourceRef, StreamHandle, Track, TrackCandidate};
pub use utils::now_millis;

// Re-export capability types
pub use catalog::{CatalogError, CatalogProvider, CatalogResult, LibraryCatalog};
pub use transport::{
    SimulatedTransport, SimulatedTransportConfig, TransportConnector, TransportError,
    TransportEvent, TransportEventSink, TransportHandle, TransportResult, TransportTarget,
};

// Re-export session types
pub use session::{
    ConnectionState, LoopMode, PlaybackSession, PlaybackState, Requester, SessionDeps,
    SessionStatus,
};

// Re-export service types
pub use services::{IdleSweeper, SessionRegistry, SessionService};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, ServerError};
