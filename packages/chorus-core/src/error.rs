//! Centralized error types for the Chorus core library.
//!
//! This module provides a unified error handling system that:
//! - Defines the session command error taxonomy using `thiserror`
//! - Maps errors to machine-readable codes and HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::transport::TransportError;

/// Error returned by playback session commands.
///
/// Command-level errors (`OutOfRange`, `InvalidMode`, `NothingPlaying`,
/// `NotPaused`, `NoMatch`) never alter session state.
#[derive(Debug, Clone, Error, Serialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum SessionError {
    /// The session has no transport connection and none could be made.
    #[error("Not connected to a transport")]
    NotConnected,

    /// The transport target is invalid, refused the connection, or did not
    /// acknowledge in time.
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// The catalog returned no candidates for the query.
    #[error("No match for query: {0}")]
    NoMatch(String),

    /// A queue position or volume outside its valid range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// A loop mode that is not one of `off`, `track`, `queue`.
    #[error("Invalid loop mode: {0}")]
    InvalidMode(String),

    /// The command needs a current track but nothing is playing.
    #[error("Nothing is playing")]
    NothingPlaying,

    /// `resume` was issued while playback is not paused.
    #[error("Playback is not paused")]
    NotPaused,

    /// The queue has no entries.
    #[error("Queue is empty")]
    EmptyQueue,

    /// The catalog failed in a way that may succeed on retry.
    #[error("Catalog temporarily unavailable: {0}")]
    TransientCatalogError(String),

    /// The catalog failed permanently for this request.
    #[error("Catalog failed: {0}")]
    CatalogFailed(String),

    /// The transport failed in a way that ends the current connection or track.
    #[error("Transport failed: {0}")]
    FatalTransportError(String),

    /// The operation was abandoned because `stop` or `leave` was issued.
    #[error("Operation cancelled")]
    Cancelled,

    /// The session has already left and accepts no further commands.
    #[error("Session closed")]
    SessionClosed,
}

impl SessionError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::TransportUnavailable(_) => "transport_unavailable",
            Self::NoMatch(_) => "no_match",
            Self::OutOfRange(_) => "out_of_range",
            Self::InvalidMode(_) => "invalid_mode",
            Self::NothingPlaying => "nothing_playing",
            Self::NotPaused => "not_paused",
            Self::EmptyQueue => "empty_queue",
            Self::TransientCatalogError(_) => "transient_catalog_error",
            Self::CatalogFailed(_) => "catalog_failed",
            Self::FatalTransportError(_) => "fatal_transport_error",
            Self::Cancelled => "cancelled",
            Self::SessionClosed => "session_closed",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoMatch(_) => StatusCode::NOT_FOUND,
            Self::OutOfRange(_) | Self::InvalidMode(_) => StatusCode::BAD_REQUEST,
            Self::NotConnected
            | Self::NothingPlaying
            | Self::NotPaused
            | Self::EmptyQueue
            | Self::Cancelled
            | Self::SessionClosed => StatusCode::CONFLICT,
            Self::TransportUnavailable(_) | Self::TransientCatalogError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::CatalogFailed(_) | Self::FatalTransportError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns true for errors that are returned synchronously and never
    /// change session state.
    #[must_use]
    pub fn is_command_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfRange(_)
                | Self::InvalidMode(_)
                | Self::NothingPlaying
                | Self::NotPaused
                | Self::NoMatch(_)
        )
    }
}

/// Convenient Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// JSON response body for error responses.
#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
    status: u16,
}

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
            status: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<CatalogError> for SessionError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Transient(msg) => Self::TransientCatalogError(msg),
            CatalogError::Permanent(msg) => Self::CatalogFailed(msg),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidTarget(_) | TransportError::Refused(_) => {
                Self::TransportUnavailable(err.to_string())
            }
            TransportError::SourceRejected(_) | TransportError::ConnectionLost(_) => {
                Self::FatalTransportError(err.to_string())
            }
        }
    }
}
