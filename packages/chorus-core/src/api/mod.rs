//! HTTP command API.
//!
//! Thin handlers that forward each request to [`SessionService`], so any
//! dispatcher that speaks HTTP can drive the sessions.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::services::SessionService;

pub mod http;
pub mod response;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),
}

/// Shared application state for the API layer.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub config: Arc<SessionConfig>,
}

/// Serves the API on `port` until `shutdown` is cancelled.
pub async fn start_server(
    state: AppState,
    port: u16,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    log::info!("[Api] Listening on http://{}", listener.local_addr()?);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}
