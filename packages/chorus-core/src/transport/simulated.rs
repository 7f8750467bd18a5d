//! Simulated transport for headless deployments and development.
//!
//! Connections are acknowledged after a configurable delay. A "stream" is a
//! timer that runs for the track's known length (or a default), honours
//! pause/resume, and reports [`TransportEvent::Finished`] when it elapses.
//! No audio is produced.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    TransportConnector, TransportError, TransportEvent, TransportEventSink, TransportHandle,
    TransportResult, TransportTarget,
};
use crate::track::StreamHandle;

/// Tunables for [`SimulatedTransport`].
#[derive(Debug, Clone)]
pub struct SimulatedTransportConfig {
    /// Delay before a connection is acknowledged.
    pub connect_delay: Duration,
    /// Length used for sources with no known duration.
    pub default_track_length: Duration,
}

impl Default for SimulatedTransportConfig {
    fn default() -> Self {
        Self {
            connect_delay: Duration::from_millis(50),
            default_track_length: Duration::from_secs(180),
        }
    }
}

/// Connector producing timer-driven connections.
pub struct SimulatedTransport {
    config: SimulatedTransportConfig,
    /// Known lengths keyed by stream handle.
    lengths: Arc<HashMap<String, Duration>>,
}

impl SimulatedTransport {
    pub fn new(config: SimulatedTransportConfig) -> Self {
        Self {
            config,
            lengths: Arc::new(HashMap::new()),
        }
    }

    /// Registers known track lengths, keyed by the handle the catalog resolves to.
    pub fn with_lengths(mut self, lengths: HashMap<String, Duration>) -> Self {
        self.lengths = Arc::new(lengths);
        self
    }
}

#[async_trait]
impl TransportConnector for SimulatedTransport {
    async fn connect(
        &self,
        target: &TransportTarget,
        events: TransportEventSink,
    ) -> TransportResult<Box<dyn TransportHandle>> {
        if target.0.trim().is_empty() || target.0.chars().any(char::is_whitespace) {
            return Err(TransportError::InvalidTarget(target.0.clone()));
        }

        tokio::time::sleep(self.config.connect_delay).await;
        log::info!("[SimulatedTransport] Connected to {}", target);

        Ok(Box::new(SimulatedConnection {
            target: target.clone(),
            events,
            lengths: Arc::clone(&self.lengths),
            default_length: self.config.default_track_length,
            active: Mutex::new(None),
            volume: AtomicU8::new(100),
            connected: AtomicBool::new(true),
        }))
    }
}

/// The stream currently running on a connection.
struct ActiveStream {
    cancel: CancellationToken,
    paused_tx: watch::Sender<bool>,
}

struct SimulatedConnection {
    target: TransportTarget,
    events: TransportEventSink,
    lengths: Arc<HashMap<String, Duration>>,
    default_length: Duration,
    active: Mutex<Option<ActiveStream>>,
    volume: AtomicU8,
    connected: AtomicBool,
}

impl SimulatedConnection {
    fn ensure_connected(&self) -> TransportResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::ConnectionLost(format!(
                "{} already disconnected",
                self.target
            )))
        }
    }

    fn set_paused(&self, paused: bool) -> TransportResult<()> {
        self.ensure_connected()?;
        if let Some(active) = self.active.lock().as_ref() {
            active.paused_tx.send_replace(paused);
        }
        Ok(())
    }

    fn cancel_active(&self) {
        if let Some(active) = self.active.lock().take() {
            active.cancel.cancel();
        }
    }
}

/// Runs one simulated stream until it elapses or is cancelled.
async fn run_stream(
    length: Duration,
    epoch: u64,
    cancel: CancellationToken,
    mut paused_rx: watch::Receiver<bool>,
    events: TransportEventSink,
) {
    let mut remaining = length;
    loop {
        if *paused_rx.borrow_and_update() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                changed = paused_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    continue;
                }
            }
        }

        let started = Instant::now();
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(remaining) => {
                events.emit(TransportEvent::Finished { epoch });
                return;
            }
            changed = paused_rx.changed() => {
                if changed.is_err() {
                    return;
                }
                remaining = remaining.saturating_sub(started.elapsed());
            }
        }
    }
}

#[async_trait]
impl TransportHandle for SimulatedConnection {
    async fn stream(&self, source: &StreamHandle, epoch: u64) -> TransportResult<()> {
        self.ensure_connected()?;
        if source.0.is_empty() {
            return Err(TransportError::SourceRejected("empty source".into()));
        }

        let length = self
            .lengths
            .get(&source.0)
            .copied()
            .unwrap_or(self.default_length);
        let cancel = CancellationToken::new();
        let (paused_tx, paused_rx) = watch::channel(false);

        {
            let mut active = self.active.lock();
            if let Some(previous) = active.take() {
                previous.cancel.cancel();
            }
            *active = Some(ActiveStream {
                cancel: cancel.clone(),
                paused_tx,
            });
        }

        log::debug!(
            "[SimulatedTransport] {} streaming {} for {:?} (epoch {})",
            self.target,
            source.0,
            length,
            epoch
        );
        tokio::spawn(run_stream(
            length,
            epoch,
            cancel,
            paused_rx,
            self.events.clone(),
        ));
        Ok(())
    }

    async fn pause(&self) -> TransportResult<()> {
        self.set_paused(true)
    }

    async fn resume(&self) -> TransportResult<()> {
        self.set_paused(false)
    }

    async fn stop(&self) -> TransportResult<()> {
        self.cancel_active();
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> TransportResult<()> {
        self.ensure_connected()?;
        self.volume.store(volume.min(100), Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.cancel_active();
        if self.connected.swap(false, Ordering::SeqCst) {
            log::info!("[SimulatedTransport] Disconnected from {}", self.target);
        }
    }
}
