//! Background task that evicts idle sessions.
//!
//! Runs on a fixed interval independent of user activity. Eviction goes
//! through [`SessionService::sweep_idle`], so every evicted session is torn
//! down with `leave()` and releases its transport.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session_service::SessionService;

pub struct IdleSweeper {
    service: Arc<SessionService>,
    interval: Duration,
}

impl IdleSweeper {
    pub fn new(service: Arc<SessionService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Sweeps every interval until `cancel_token` fires.
    pub async fn run(self, cancel_token: CancellationToken) {
        log::info!("[Sweeper] Started (interval {:?})", self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be idle yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    log::info!("[Sweeper] Shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = self.service.sweep_idle(Instant::now()).await;
                    if evicted > 0 {
                        log::info!("[Sweeper] Evicted {} idle session(s)", evicted);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::runtime::TokioSpawner;
    use crate::services::SessionRegistry;
    use crate::session::ConnectionState;
    use crate::test_support::{session_deps, test_config, MockCatalog, MockTransport};
    use crate::track::GroupId;
    use crate::transport::TransportTarget;

    #[tokio::test(start_paused = true)]
    async fn evicts_after_idle_timeout_and_stops_on_cancel() {
        let transport = Arc::new(MockTransport::new());
        let config = crate::config::SessionConfig {
            idle_timeout_secs: 60,
            ..test_config()
        };
        let service = Arc::new(SessionService::new(
            Arc::new(SessionRegistry::new()),
            session_deps(
                Arc::new(MockCatalog::new()),
                transport.clone(),
                Arc::new(NoopEventEmitter),
                config,
            ),
            TokioSpawner::current(),
        ));
        let group = GroupId::from("g");
        service
            .join(&group, TransportTarget("voice-1".into()))
            .await
            .unwrap();
        assert_eq!(
            service.status(&group).unwrap().connection,
            ConnectionState::Connected
        );

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            IdleSweeper::new(Arc::clone(&service), Duration::from_secs(10)).run(cancel.clone()),
        );

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(service.status(&group).is_some());

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert!(service.status(&group).is_none());
        assert_eq!(transport.disconnect_count(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
