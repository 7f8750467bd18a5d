//! Application services layer.
//!
//! This module sits between the dispatch surface (HTTP API, chat bot) and the
//! per-group session actors.

pub mod idle_sweeper;
pub mod session_registry;
pub mod session_service;

pub use idle_sweeper::IdleSweeper;
pub use session_registry::SessionRegistry;
pub use session_service::SessionService;
