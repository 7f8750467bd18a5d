//! Scriptable capabilities and fixtures shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::catalog::{CatalogError, CatalogProvider, CatalogResult};
use crate::config::SessionConfig;
use crate::events::{BroadcastEvent, EventEmitter, PlaybackEvent, SessionEvent};
use crate::runtime::TokioSpawner;
use crate::session::{PlaybackSession, SessionDeps};
use crate::track::{GroupId, SourceRef, StreamHandle, Track, TrackCandidate};
use crate::transport::{
    TransportConnector, TransportError, TransportEvent, TransportEventSink, TransportHandle,
    TransportResult, TransportTarget,
};

pub(crate) fn candidate(title: &str) -> TrackCandidate {
    TrackCandidate {
        id: title.to_string(),
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        duration: Some(Duration::from_secs(180)),
        source: SourceRef(format!("src:{}", title)),
    }
}

pub(crate) fn track(title: &str) -> Track {
    Track::from_candidate(candidate(title), "tester")
}

/// Session settings with short delays for tests.
pub(crate) fn test_config() -> SessionConfig {
    SessionConfig {
        join_timeout_ms: 1000,
        catalog_retry_delays_ms: vec![10, 10],
        ..SessionConfig::default()
    }
}

pub(crate) fn session_deps(
    catalog: Arc<MockCatalog>,
    transport: Arc<MockTransport>,
    emitter: Arc<dyn EventEmitter>,
    config: SessionConfig,
) -> SessionDeps {
    SessionDeps {
        catalog,
        transport,
        emitter,
        config: Arc::new(config),
    }
}

pub(crate) fn spawn_session(
    group: &str,
    catalog: Arc<MockCatalog>,
    transport: Arc<MockTransport>,
    emitter: Arc<dyn EventEmitter>,
    config: SessionConfig,
) -> PlaybackSession {
    PlaybackSession::spawn(
        GroupId::from(group),
        session_deps(catalog, transport, emitter, config),
        &TokioSpawner::current(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory catalog with scripted failures.
///
/// Unknown queries return no candidates. Sources resolve to a handle with the
/// same text unless a failure was registered for the title.
#[derive(Default)]
pub(crate) struct MockCatalog {
    results: Mutex<HashMap<String, Vec<TrackCandidate>>>,
    search_failures: Mutex<VecDeque<CatalogError>>,
    resolve_failures: Mutex<HashMap<String, CatalogError>>,
    searches: AtomicUsize,
    hang: AtomicBool,
}

impl MockCatalog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, query: &str, candidates: Vec<TrackCandidate>) {
        self.results.lock().insert(query.to_string(), candidates);
    }

    /// Each listed error is returned by one upcoming search, in order.
    pub(crate) fn fail_next_searches(&self, errors: Vec<CatalogError>) {
        self.search_failures.lock().extend(errors);
    }

    /// Makes every resolve of the candidate titled `title` fail.
    pub(crate) fn fail_resolve(&self, title: &str, error: CatalogError) {
        self.resolve_failures
            .lock()
            .insert(format!("src:{}", title), error);
    }

    /// Searches started after this never complete.
    pub(crate) fn hang_searches(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop_hanging(&self) {
        self.hang.store(false, Ordering::SeqCst);
    }

    pub(crate) fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogProvider for MockCatalog {
    async fn search(&self, query: &str) -> CatalogResult<Vec<TrackCandidate>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.search_failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.results.lock().get(query).cloned().unwrap_or_default())
    }

    async fn resolve_source(&self, source: &SourceRef) -> CatalogResult<StreamHandle> {
        if let Some(err) = self.resolve_failures.lock().get(&source.0) {
            return Err(err.clone());
        }
        Ok(StreamHandle(source.0.clone()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// A call made on a mock connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TransportCall {
    Stream { source: String, epoch: u64 },
    Pause,
    Resume,
    Stop,
    SetVolume(u8),
}

#[derive(Default)]
struct MockTransportState {
    calls: Mutex<Vec<TransportCall>>,
    sinks: Mutex<Vec<TransportEventSink>>,
    stream_failures: Mutex<HashMap<String, TransportError>>,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    hang_connect: AtomicBool,
    refuse_connect: AtomicBool,
}

/// Transport that records calls and lets tests inject events.
///
/// Injected events go through the sink of the most recent connection.
#[derive(Default)]
pub(crate) struct MockTransport {
    state: Arc<MockTransportState>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn hang_connects(&self) {
        self.state.hang_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop_hanging(&self) {
        self.state.hang_connect.store(false, Ordering::SeqCst);
    }

    pub(crate) fn refuse_connects(&self) {
        self.state.refuse_connect.store(true, Ordering::SeqCst);
    }

    /// Makes streaming the candidate titled `title` fail with `error`.
    pub(crate) fn fail_stream(&self, title: &str, error: TransportError) {
        self.state
            .stream_failures
            .lock()
            .insert(format!("src:{}", title), error);
    }

    pub(crate) fn calls(&self) -> Vec<TransportCall> {
        self.state.calls.lock().clone()
    }

    /// Successful stream starts as `(source, epoch)`.
    pub(crate) fn streams(&self) -> Vec<(String, u64)> {
        self.state
            .calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                TransportCall::Stream { source, epoch } => Some((source.clone(), *epoch)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub(crate) fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sink) = self.state.sinks.lock().last() {
            sink.emit(event);
        }
    }

    pub(crate) fn finish(&self, epoch: u64) {
        self.emit(TransportEvent::Finished { epoch });
    }

    pub(crate) fn fail(&self, epoch: u64, reason: &str) {
        self.emit(TransportEvent::Failed {
            epoch,
            reason: reason.to_string(),
        });
    }

    pub(crate) fn drop_connection(&self, reason: &str) {
        self.emit(TransportEvent::Disconnected {
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl TransportConnector for MockTransport {
    async fn connect(
        &self,
        target: &TransportTarget,
        events: TransportEventSink,
    ) -> TransportResult<Box<dyn TransportHandle>> {
        if self.state.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Refused(target.0.clone()));
        }
        if self.state.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.sinks.lock().push(events);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    state: Arc<MockTransportState>,
}

impl MockConnection {
    fn record(&self, call: TransportCall) {
        self.state.calls.lock().push(call);
    }
}

#[async_trait]
impl TransportHandle for MockConnection {
    async fn stream(&self, source: &StreamHandle, epoch: u64) -> TransportResult<()> {
        if let Some(err) = self.state.stream_failures.lock().get(&source.0) {
            return Err(err.clone());
        }
        self.record(TransportCall::Stream {
            source: source.0.clone(),
            epoch,
        });
        Ok(())
    }

    async fn pause(&self) -> TransportResult<()> {
        self.record(TransportCall::Pause);
        Ok(())
    }

    async fn resume(&self) -> TransportResult<()> {
        self.record(TransportCall::Resume);
        Ok(())
    }

    async fn stop(&self) -> TransportResult<()> {
        self.record(TransportCall::Stop);
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> TransportResult<()> {
        self.record(TransportCall::SetVolume(volume));
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

/// Emitter that keeps every event for later assertions.
#[derive(Default)]
pub(crate) struct RecordingEmitter {
    events: Mutex<Vec<BroadcastEvent>>,
}

impl RecordingEmitter {
    pub(crate) fn all(&self) -> Vec<BroadcastEvent> {
        self.events.lock().clone()
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit_playback(&self, event: PlaybackEvent) {
        self.events.lock().push(event.into());
    }

    fn emit_session(&self, event: SessionEvent) {
        self.events.lock().push(event.into());
    }
}
