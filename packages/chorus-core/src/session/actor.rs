//! The task that owns one session's state.

use std::future::Future;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{
    Command, ConnectionState, LoopMode, PlaybackState, Reply, Requester, SessionDeps,
    SessionMessage, SessionStatus,
};
use crate::catalog::search_with_retry;
use crate::error::{SessionError, SessionResult};
use crate::events::{CloseReason, EndReason, PlaybackEvent, SessionEvent};
use crate::queue::TrackQueue;
use crate::track::{GroupId, Track};
use crate::transport::{
    TransportError, TransportEvent, TransportEventSink, TransportHandle, TransportTarget,
};
use crate::utils::now_millis;

/// Runs `fut` unless `scope` is cancelled first.
async fn cancellable<T>(
    scope: &CancellationToken,
    fut: impl Future<Output = SessionResult<T>>,
) -> SessionResult<T> {
    tokio::select! {
        biased;
        _ = scope.cancelled() => Err(SessionError::Cancelled),
        result = fut => result,
    }
}

pub(super) struct SessionActor {
    id: Uuid,
    group: GroupId,
    deps: SessionDeps,
    rx: mpsc::UnboundedReceiver<SessionMessage>,
    /// Weak so dropped handles are not kept alive by the actor itself.
    self_tx: mpsc::WeakUnboundedSender<SessionMessage>,
    status_out: Arc<RwLock<SessionStatus>>,
    scope: Arc<Mutex<CancellationToken>>,

    connection: ConnectionState,
    transport: Option<Box<dyn TransportHandle>>,
    /// Incremented per connection attempt; tags the event sink.
    connection_id: u64,
    playback: PlaybackState,
    current: Option<Track>,
    queue: TrackQueue,
    loop_mode: LoopMode,
    volume: u8,
    epoch: u64,
    /// Latest epoch a user command ended or started.
    user_epoch: u64,
    last_activity: Instant,
    last_activity_ms: u64,
    idle_since: Option<Instant>,
    closed: bool,
}

impl SessionActor {
    pub(super) fn new(
        id: Uuid,
        group: GroupId,
        deps: SessionDeps,
        rx: mpsc::UnboundedReceiver<SessionMessage>,
        self_tx: mpsc::WeakUnboundedSender<SessionMessage>,
        status_out: Arc<RwLock<SessionStatus>>,
        scope: Arc<Mutex<CancellationToken>>,
    ) -> Self {
        let volume = deps.config.default_volume;
        Self {
            id,
            group,
            deps,
            rx,
            self_tx,
            status_out,
            scope,
            connection: ConnectionState::Disconnected,
            transport: None,
            connection_id: 0,
            playback: PlaybackState::Idle,
            current: None,
            queue: TrackQueue::new(),
            loop_mode: LoopMode::Off,
            volume,
            epoch: 0,
            user_epoch: 0,
            last_activity: Instant::now(),
            last_activity_ms: now_millis(),
            idle_since: None,
            closed: false,
        }
    }

    pub(super) async fn run(mut self) {
        log::debug!("[Session] Actor for {} started", self.group);

        while let Some(message) = self.rx.recv().await {
            match message {
                SessionMessage::Command(command) => self.handle_command(command).await,
                SessionMessage::Transport { connection, event } => {
                    self.handle_transport_event(connection, event).await;
                    self.publish();
                }
            }
            if self.closed {
                break;
            }
        }

        // Commands still queued get their reply channel dropped, which the
        // handle reports as SessionClosed.
        self.rx.close();
        log::debug!("[Session] Actor for {} stopped", self.group);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_command(&mut self, command: Command) {
        if !matches!(command, Command::Status { .. }) {
            self.last_activity = Instant::now();
            self.last_activity_ms = now_millis();
        }

        match command {
            Command::Join { target, reply } => {
                let result = self.join(target).await;
                self.respond(reply, result);
            }
            Command::Play {
                query,
                requester,
                reply,
            } => {
                let result = self.play(query, requester).await;
                self.respond(reply, result);
            }
            Command::Pause { reply } => {
                let result = self.pause().await;
                self.respond(reply, result);
            }
            Command::Resume { reply } => {
                let result = self.resume().await;
                self.respond(reply, result);
            }
            Command::Skip { observed, reply } => {
                let result = self.skip(observed).await;
                self.respond(reply, result);
            }
            Command::Stop { reply } => {
                self.reset_scope();
                self.stop().await;
                self.respond(reply, Ok(()));
            }
            Command::Remove { position, reply } => {
                let result = self.queue.remove_at(position);
                self.respond(reply, result);
            }
            Command::Shuffle { reply } => {
                self.queue.shuffle();
                self.respond(reply, Ok(()));
            }
            Command::SetVolume { volume, reply } => {
                self.set_volume(volume).await;
                self.respond(reply, Ok(()));
            }
            Command::SetLoop { mode, reply } => {
                log::info!("[Session] {} loop mode {} -> {}", self.group, self.loop_mode, mode);
                self.loop_mode = mode;
                self.respond(reply, Ok(()));
            }
            Command::Status { reply } => {
                self.publish();
                let _ = reply.send(Ok(self.snapshot()));
            }
            Command::Leave { reason, reply } => {
                self.reset_scope();
                self.leave(reason).await;
                self.respond(reply, Ok(()));
            }
        }
    }

    /// Publishes the new state, then replies, so a caller that awaited the
    /// command always observes its effect.
    fn respond<T>(&mut self, reply: Reply<T>, result: SessionResult<T>) {
        self.publish();
        if reply.send(result).is_err() {
            log::debug!("[Session] {} caller went away before reply", self.group);
        }
    }

    async fn join(&mut self, target: TransportTarget) -> SessionResult<()> {
        match self.connection {
            ConnectionState::Connected => return Ok(()),
            ConnectionState::Connecting => {
                return Err(SessionError::TransportUnavailable(
                    "connection attempt already in progress".into(),
                ))
            }
            ConnectionState::Disconnected => {}
        }

        let Some(tx) = self.self_tx.upgrade() else {
            return Err(SessionError::SessionClosed);
        };

        let scope = self.current_scope();
        self.connection_id += 1;
        let sink = TransportEventSink::new(self.connection_id, tx);
        self.connection = ConnectionState::Connecting;
        self.publish();

        log::info!("[Session] {} connecting to {}", self.group, target);
        let connector = Arc::clone(&self.deps.transport);
        let timeout = self.deps.config.join_timeout();
        let attempt = cancellable(&scope, async {
            match tokio::time::timeout(timeout, connector.connect(&target, sink)).await {
                Ok(result) => result.map_err(SessionError::from),
                Err(_) => Err(SessionError::TransportUnavailable(format!(
                    "{} did not acknowledge within {}ms",
                    target,
                    timeout.as_millis()
                ))),
            }
        })
        .await;

        let transport = match attempt {
            Ok(transport) => transport,
            Err(err) => {
                log::warn!("[Session] {} join {} failed: {}", self.group, target, err);
                self.connection = ConnectionState::Disconnected;
                return Err(err);
            }
        };

        if let Err(e) = transport.set_volume(self.volume).await {
            log::warn!("[Session] {} failed to apply volume: {}", self.group, e);
        }
        self.transport = Some(transport);
        self.connection = ConnectionState::Connected;
        self.playback = PlaybackState::Idle;

        log::info!("[Session] {} connected to {}", self.group, target);
        self.deps.emitter.emit_session(SessionEvent::Connected {
            group: self.group.clone(),
            target: target.0,
            timestamp: now_millis(),
        });
        Ok(())
    }

    async fn play(&mut self, query: String, requester: Requester) -> SessionResult<Track> {
        let scope = self.current_scope();

        if self.connection != ConnectionState::Connected {
            let target = requester.target.clone().ok_or(SessionError::NotConnected)?;
            self.join(target).await?;
        }

        let catalog = Arc::clone(&self.deps.catalog);
        let delays = self.deps.config.catalog_retry_delays_ms.clone();
        let candidates = cancellable(&scope, async {
            search_with_retry(catalog.as_ref(), &query, &delays)
                .await
                .map_err(SessionError::from)
        })
        .await?;

        let candidate = candidates
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::NoMatch(query.clone()))?;
        let track = Track::from_candidate(candidate, requester.id);

        self.queue.enqueue(track.clone());
        let position = self.queue.len() - 1;
        log::info!(
            "[Session] {} queued '{}' at position {} for {}",
            self.group,
            track.title(),
            position,
            track.requester()
        );
        self.deps.emitter.emit_playback(PlaybackEvent::TrackQueued {
            group: self.group.clone(),
            track: track.clone(),
            position,
            timestamp: now_millis(),
        });

        if self.playback == PlaybackState::Idle {
            let started = self.advance(None, &scope).await;
            self.user_epoch = self.epoch;
            started?;
        }
        Ok(track)
    }

    async fn pause(&mut self) -> SessionResult<()> {
        if self.playback != PlaybackState::Playing {
            return Err(SessionError::NothingPlaying);
        }
        let Some(transport) = self.transport.as_ref() else {
            return Err(SessionError::NothingPlaying);
        };
        let result = transport.pause().await;
        if let Err(err) = result {
            return Err(self.transport_failure(err).await);
        }
        self.playback = PlaybackState::Paused;
        log::info!("[Session] {} paused", self.group);
        Ok(())
    }

    async fn resume(&mut self) -> SessionResult<()> {
        if self.playback != PlaybackState::Paused {
            return Err(SessionError::NotPaused);
        }
        let Some(transport) = self.transport.as_ref() else {
            return Err(SessionError::NotPaused);
        };
        let result = transport.resume().await;
        if let Err(err) = result {
            return Err(self.transport_failure(err).await);
        }
        self.playback = PlaybackState::Playing;
        log::info!("[Session] {} resumed", self.group);
        Ok(())
    }

    async fn skip(&mut self, observed: Option<u64>) -> SessionResult<()> {
        // The observed stream ended on its own (a transport completion got
        // in first) and no user command has moved playback since.
        if let Some(epoch) = observed {
            if epoch < self.epoch && epoch >= self.user_epoch {
                log::debug!(
                    "[Session] {} skip of epoch {} already satisfied (now {})",
                    self.group,
                    epoch,
                    self.epoch
                );
                return Ok(());
            }
        }
        let Some(track) = self.current.take() else {
            return Err(SessionError::NothingPlaying);
        };
        self.user_epoch = self.epoch;

        self.stop_stream().await;
        if self.connection != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }

        log::info!("[Session] {} skipped '{}'", self.group, track.title());
        self.emit_ended(&track, EndReason::Skipped);
        let scope = self.current_scope();
        let result = self.advance(Some(track), &scope).await;
        self.user_epoch = self.epoch;
        result
    }

    async fn stop(&mut self) {
        if self.current.is_some() {
            self.user_epoch = self.epoch;
            self.stop_stream().await;
        }
        self.queue.clear();
        self.current = None;
        self.playback = PlaybackState::Idle;
        log::info!("[Session] {} stopped", self.group);
    }

    async fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let result = transport.set_volume(volume).await;
        if let Err(err) = result {
            let err = self.transport_failure(err).await;
            log::warn!("[Session] {} volume not applied live: {}", self.group, err);
        }
    }

    async fn leave(&mut self, reason: CloseReason) {
        self.stop().await;
        if let Some(transport) = self.transport.take() {
            transport.disconnect().await;
        }
        self.connection = ConnectionState::Disconnected;
        self.closed = true;

        log::info!("[Session] {} left ({:?})", self.group, reason);
        self.deps.emitter.emit_session(SessionEvent::Closed {
            group: self.group.clone(),
            reason,
            timestamp: now_millis(),
        });
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Advance
    // ─────────────────────────────────────────────────────────────────────────

    /// Decides what plays next after `finished` ended (or from idle when
    /// `None`) and starts it.
    ///
    /// Entries that fail to start are dropped and the next one is tried, for
    /// at most one pass over the queue. Returns the last failure if nothing
    /// could be started.
    async fn advance(
        &mut self,
        finished: Option<Track>,
        scope: &CancellationToken,
    ) -> SessionResult<()> {
        self.current = None;
        self.playback = PlaybackState::Idle;
        let mut last_error = None;

        if let Some(track) = finished {
            match self.loop_mode {
                LoopMode::Track => match self.start_track(track, scope).await {
                    Ok(()) => return Ok(()),
                    Err(err) if self.pass_aborted(&err) => return Err(err),
                    Err(err) => last_error = Some(err),
                },
                LoopMode::Queue => self.queue.enqueue(track),
                LoopMode::Off => {}
            }
        }

        let budget = self.queue.len();
        for _ in 0..budget {
            let Ok(next) = self.queue.pop_front() else {
                break;
            };
            match self.start_track(next, scope).await {
                Ok(()) => return Ok(()),
                Err(err) if self.pass_aborted(&err) => return Err(err),
                Err(err) => last_error = Some(err),
            }
        }

        match last_error {
            Some(err) => {
                log::warn!("[Session] {} nothing playable in queue: {}", self.group, err);
                self.deps.emitter.emit_playback(PlaybackEvent::QueueExhausted {
                    group: self.group.clone(),
                    error: err.to_string(),
                    timestamp: now_millis(),
                });
                Err(err)
            }
            None => {
                log::debug!("[Session] {} queue empty, now idle", self.group);
                Ok(())
            }
        }
    }

    fn pass_aborted(&self, err: &SessionError) -> bool {
        matches!(err, SessionError::Cancelled) || self.connection != ConnectionState::Connected
    }

    /// Resolves and streams one track under a new epoch.
    async fn start_track(&mut self, track: Track, scope: &CancellationToken) -> SessionResult<()> {
        let catalog = Arc::clone(&self.deps.catalog);
        let resolved = cancellable(scope, async {
            catalog
                .resolve_source(track.source())
                .await
                .map_err(SessionError::from)
        })
        .await;
        let handle = match resolved {
            Ok(handle) => handle,
            Err(SessionError::Cancelled) => return Err(SessionError::Cancelled),
            Err(err) => {
                self.emit_failed(&track, &err);
                return Err(err);
            }
        };

        let Some(transport) = self.transport.as_ref() else {
            return Err(SessionError::NotConnected);
        };
        let epoch = self.epoch + 1;
        let streamed = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(SessionError::Cancelled),
            result = transport.stream(&handle, epoch) => result,
        };

        if let Err(err) = streamed {
            let fatal = err.is_connection_fatal();
            let err = SessionError::from(err);
            self.emit_failed(&track, &err);
            if fatal {
                self.force_disconnect(err.to_string()).await;
            }
            return Err(err);
        }

        self.epoch = epoch;
        self.playback = PlaybackState::Playing;
        log::info!(
            "[Session] {} now playing '{}' (epoch {})",
            self.group,
            track.title(),
            epoch
        );
        self.deps.emitter.emit_playback(PlaybackEvent::TrackStarted {
            group: self.group.clone(),
            track: track.clone(),
            epoch,
            timestamp: now_millis(),
        });
        self.current = Some(track);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport events
    // ─────────────────────────────────────────────────────────────────────────

    async fn handle_transport_event(&mut self, connection: u64, event: TransportEvent) {
        if connection != self.connection_id || self.transport.is_none() {
            log::debug!(
                "[Session] {} dropping event from stale connection {}: {:?}",
                self.group,
                connection,
                event
            );
            return;
        }

        match event {
            TransportEvent::Finished { epoch } => {
                let Some(track) = self.take_current_for(epoch) else {
                    return;
                };
                log::debug!("[Session] {} finished '{}'", self.group, track.title());
                self.emit_ended(&track, EndReason::Finished);
                let scope = self.current_scope();
                if let Err(e) = self.advance(Some(track), &scope).await {
                    log::warn!("[Session] {} advance after finish failed: {}", self.group, e);
                }
            }
            TransportEvent::Failed { epoch, reason } => {
                let Some(track) = self.take_current_for(epoch) else {
                    return;
                };
                log::warn!(
                    "[Session] {} stream of '{}' failed: {}",
                    self.group,
                    track.title(),
                    reason
                );
                self.emit_failed(&track, &SessionError::FatalTransportError(reason));
                let scope = self.current_scope();
                if let Err(e) = self.advance(None, &scope).await {
                    log::warn!("[Session] {} advance after failure failed: {}", self.group, e);
                }
            }
            TransportEvent::Disconnected { reason } => {
                self.force_disconnect(reason).await;
            }
        }
    }

    /// Takes the current track if `epoch` is the live stream.
    fn take_current_for(&mut self, epoch: u64) -> Option<Track> {
        if epoch != self.epoch {
            log::debug!(
                "[Session] {} dropping event for stale epoch {} (now {})",
                self.group,
                epoch,
                self.epoch
            );
            return None;
        }
        self.current.take()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Stops the live stream. Only connection loss is acted on.
    async fn stop_stream(&mut self) {
        let Some(transport) = self.transport.as_ref() else {
            return;
        };
        let result = transport.stop().await;
        if let Err(err) = result {
            let err = self.transport_failure(err).await;
            log::warn!("[Session] {} failed to stop stream: {}", self.group, err);
        }
    }

    /// Converts a transport error, dropping the connection if it is gone.
    async fn transport_failure(&mut self, err: TransportError) -> SessionError {
        if err.is_connection_fatal() {
            self.force_disconnect(err.to_string()).await;
        }
        SessionError::from(err)
    }

    /// Drops the transport and returns to disconnected/idle. The queue is kept
    /// so playback can continue after a new join.
    async fn force_disconnect(&mut self, reason: String) {
        if let Some(transport) = self.transport.take() {
            transport.disconnect().await;
        }
        self.connection = ConnectionState::Disconnected;
        self.playback = PlaybackState::Idle;
        self.current = None;

        log::warn!("[Session] {} lost connection: {}", self.group, reason);
        self.deps.emitter.emit_session(SessionEvent::ConnectionLost {
            group: self.group.clone(),
            reason,
            timestamp: now_millis(),
        });
    }

    fn current_scope(&self) -> CancellationToken {
        self.scope.lock().clone()
    }

    fn reset_scope(&self) {
        *self.scope.lock() = CancellationToken::new();
    }

    fn emit_ended(&self, track: &Track, reason: EndReason) {
        self.deps.emitter.emit_playback(PlaybackEvent::TrackEnded {
            group: self.group.clone(),
            track_id: track.id().to_string(),
            reason,
            timestamp: now_millis(),
        });
    }

    fn emit_failed(&self, track: &Track, err: &SessionError) {
        log::warn!(
            "[Session] {} could not play '{}': {}",
            self.group,
            track.title(),
            err
        );
        self.deps.emitter.emit_playback(PlaybackEvent::TrackFailed {
            group: self.group.clone(),
            track_id: track.id().to_string(),
            error: err.to_string(),
            timestamp: now_millis(),
        });
    }

    fn snapshot(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            group: self.group.clone(),
            connection: self.connection,
            playback: self.playback,
            volume: self.volume,
            loop_mode: self.loop_mode,
            current: self.current.clone(),
            queue: self.queue.to_vec(),
            epoch: self.epoch,
            last_activity_ms: self.last_activity_ms,
            last_activity: self.last_activity,
            idle_since: self.idle_since,
        }
    }

    fn publish(&mut self) {
        let idle =
            self.connection == ConnectionState::Connected && self.playback == PlaybackState::Idle;
        self.idle_since = if idle {
            Some(match self.idle_since {
                Some(since) => since.max(self.last_activity),
                None => Instant::now(),
            })
        } else {
            None
        };
        *self.status_out.write() = self.snapshot();
    }
}
