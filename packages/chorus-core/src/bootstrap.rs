//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! registry, session service, event bridge and sweeper are instantiated and
//! wired together. Catalog and transport capabilities are supplied by the
//! caller so embedders can plug in real backends.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::api::AppState;
use crate::catalog::CatalogProvider;
use crate::config::SessionConfig;
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::services::{IdleSweeper, SessionRegistry, SessionService};
use crate::session::SessionDeps;
use crate::transport::TransportConnector;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Process-wide group -> session map.
    pub registry: Arc<SessionRegistry>,
    /// Per-group command surface.
    pub sessions: Arc<SessionService>,
    /// Event bridge that fans session events out to subscribers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Broadcast channel sender for session events.
    pub broadcast_tx: broadcast::Sender<BroadcastEvent>,
    /// Validated session settings.
    pub config: Arc<SessionConfig>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Spawns the idle sweeper. It stops when `cancel_token` is cancelled.
    pub fn start_background_tasks(&self) {
        let sweeper = IdleSweeper::new(Arc::clone(&self.sessions), self.config.sweep_interval());
        self.spawner.spawn(sweeper.run(self.cancel_token.clone()));
    }

    /// Mirrors every domain event into the debug log.
    pub fn log_events(&self) {
        self.event_bridge.set_external_emitter(Arc::new(LoggingEventEmitter));
    }

    /// Builds the shared state for the HTTP API.
    pub fn app_state(&self) -> AppState {
        AppState {
            sessions: Arc::clone(&self.sessions),
            config: Arc::clone(&self.config),
        }
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Signal cancellation to all background tasks
        self.cancel_token.cancel();

        // Leave every session so transports are released
        let open = self.registry.len();
        self.sessions.shutdown().await;
        log::info!("[Bootstrap] Closed {} session(s)", open);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps all services with their dependencies.
///
/// Wiring order:
///
/// 1. Broadcast channel and event bridge
/// 2. Cancellation token and spawner
/// 3. Session registry
/// 4. Session service (depends on registry, capabilities, event bridge)
///
/// # Errors
///
/// Returns the validation message if `config` is invalid.
pub fn bootstrap_services(
    config: SessionConfig,
    catalog: Arc<dyn CatalogProvider>,
    transport: Arc<dyn TransportConnector>,
) -> Result<BootstrappedServices, String> {
    config.validate()?;
    let config = Arc::new(config);

    // Create task spawner from current runtime
    let spawner = TokioSpawner::current();

    // Create broadcast channel for session events
    let (broadcast_tx, _) = broadcast::channel::<BroadcastEvent>(config.event_channel_capacity);

    // Create the event bridge that maps domain events to broadcast transport
    let event_bridge = Arc::new(BroadcastEventBridge::with_sender(broadcast_tx.clone()));

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    let registry = Arc::new(SessionRegistry::new());

    let deps = SessionDeps {
        catalog,
        transport,
        emitter: Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
        config: Arc::clone(&config),
    };
    let sessions = Arc::new(SessionService::new(
        Arc::clone(&registry),
        deps,
        spawner.clone(),
    ));

    Ok(BootstrappedServices {
        registry,
        sessions,
        event_bridge,
        broadcast_tx,
        config,
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::SessionEvent;
    use crate::session::Requester;
    use crate::test_support::{candidate, MockCatalog, MockTransport};
    use crate::track::GroupId;

    #[tokio::test]
    async fn rejects_invalid_config() {
        let config = SessionConfig {
            default_volume: 150,
            ..Default::default()
        };
        let result = bootstrap_services(
            config,
            Arc::new(MockCatalog::new()),
            Arc::new(MockTransport::new()),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn events_reach_subscribers_and_shutdown_closes_sessions() {
        let catalog = Arc::new(MockCatalog::new());
        let transport = Arc::new(MockTransport::new());
        catalog.add("x", vec![candidate("x")]);
        let services =
            bootstrap_services(SessionConfig::default(), catalog, transport.clone()).unwrap();
        let mut rx = services.event_bridge.subscribe();
        services.start_background_tasks();

        services
            .sessions
            .play(
                &GroupId::from("g"),
                "x",
                Requester::new("u").with_target("voice-1"),
            )
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            BroadcastEvent::Session(SessionEvent::Created { group, .. }) => {
                assert_eq!(group.as_str(), "g");
            }
            other => panic!("unexpected first event: {:?}", other),
        }

        services.shutdown().await;

        assert!(services.cancel_token.is_cancelled());
        assert!(services.registry.is_empty());
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn logged_events_still_reach_subscribers() {
        let services = bootstrap_services(
            SessionConfig::default(),
            Arc::new(MockCatalog::new()),
            Arc::new(MockTransport::new()),
        )
        .unwrap();
        let mut rx = services.event_bridge.subscribe();
        assert!(!services.event_bridge.has_external_emitter());

        services.log_events();
        services.sessions.set_volume(&GroupId::from("g"), 10).await.unwrap();

        assert!(services.event_bridge.has_external_emitter());
        assert!(matches!(
            rx.recv().await.unwrap(),
            BroadcastEvent::Session(SessionEvent::Created { .. })
        ));
    }
}
