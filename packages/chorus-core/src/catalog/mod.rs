//! Track catalog capability.
//!
//! Sessions depend on the [`CatalogProvider`] trait rather than a concrete
//! catalog service. The crate ships [`LibraryCatalog`], an in-memory catalog
//! used by the standalone server and the tests.

mod library;
mod retry;

pub use library::LibraryCatalog;
pub(crate) use retry::search_with_retry;

use async_trait::async_trait;
use thiserror::Error;

use crate::track::{SourceRef, StreamHandle, TrackCandidate};

/// Errors reported by a catalog.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The request may succeed if retried (rate limit, timeout, 5xx).
    #[error("transient catalog failure: {0}")]
    Transient(String),

    /// The request will not succeed on retry (removed item, bad query).
    #[error("permanent catalog failure: {0}")]
    Permanent(String),
}

impl CatalogError {
    /// Returns true if this error is transient and the operation should be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Convenient Result alias for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Resolves free-text queries to playable track candidates.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Returns candidates for `query`, best match first. May be empty.
    async fn search(&self, query: &str) -> CatalogResult<Vec<TrackCandidate>>;

    /// Obtains (or refreshes) the streamable source for a chosen candidate.
    ///
    /// Called before every stream start, so implementations backed by
    /// expiring URLs always hand out a fresh handle.
    async fn resolve_source(&self, source: &SourceRef) -> CatalogResult<StreamHandle>;
}
