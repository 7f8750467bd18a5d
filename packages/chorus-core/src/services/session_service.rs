//! Per-group command surface.
//!
//! The service resolves a group to its session through the registry
//! (creating it on first use) and forwards one operation. Dispatchers such
//! as the HTTP API or a chat bot only talk to this type.

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::Instant;

use super::session_registry::SessionRegistry;
use crate::error::{SessionError, SessionResult};
use crate::events::CloseReason;
use crate::runtime::TokioSpawner;
use crate::session::{
    ConnectionState, LoopMode, PlaybackSession, Requester, SessionDeps, SessionStatus,
};
use crate::track::{GroupId, Track};
use crate::transport::TransportTarget;

pub struct SessionService {
    registry: Arc<SessionRegistry>,
    deps: SessionDeps,
    spawner: TokioSpawner,
}

impl SessionService {
    pub fn new(registry: Arc<SessionRegistry>, deps: SessionDeps, spawner: TokioSpawner) -> Self {
        Self {
            registry,
            deps,
            spawner,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Returns the session for `group`, spawning one if needed.
    pub fn session(&self, group: &GroupId) -> PlaybackSession {
        self.acquire(group).0
    }

    /// Like [`Self::session`], also reporting whether this call created it.
    fn acquire(&self, group: &GroupId) -> (PlaybackSession, bool) {
        let mut created = false;
        let session = self.registry.get_or_create(group, || {
            created = true;
            PlaybackSession::spawn(group.clone(), self.deps.clone(), &self.spawner)
        });
        (session, created)
    }

    /// Runs `op` on the group's session.
    ///
    /// Retries once on a fresh session if the one it reached was torn down
    /// underneath it (by the sweeper or a concurrent discard). A session this
    /// call created is discarded again when `op` fails and leaves it
    /// disconnected with nothing queued.
    async fn on_session<T, F, Fut>(&self, group: &GroupId, op: F) -> SessionResult<T>
    where
        F: Fn(PlaybackSession) -> Fut,
        Fut: Future<Output = SessionResult<T>>,
    {
        let (mut session, mut created) = self.acquire(group);
        let mut result = op(session.clone()).await;
        if torn_down_under(&session, &result) {
            log::debug!("[SessionService] Session for {} closed mid-command, retrying", group);
            (session, created) = self.acquire(group);
            result = op(session.clone()).await;
        }

        if let Err(e) = &result {
            if e.is_command_error() || matches!(e, SessionError::Cancelled) {
                log::debug!("[SessionService] {} rejected command: {}", group, e);
            } else {
                log::warn!("[SessionService] {} command failed: {}", group, e);
            }
            if created {
                self.discard_if_unused(group, &session).await;
            }
        }
        result
    }

    async fn discard_if_unused(&self, group: &GroupId, session: &PlaybackSession) {
        let status = session.status();
        let unused = status.connection == ConnectionState::Disconnected
            && status.current.is_none()
            && status.queue.is_empty();
        if !unused || !self.registry.remove_if_same(group, session) {
            return;
        }
        log::debug!("[SessionService] Discarding unused session for {}", group);
        if let Err(e) = session.leave(CloseReason::Abandoned).await {
            log::warn!("[SessionService] Failed to close {}: {}", group, e);
        }
    }

    pub async fn join(&self, group: &GroupId, target: TransportTarget) -> SessionResult<()> {
        self.on_session(group, |s| {
            let target = target.clone();
            async move { s.join(target).await }
        })
        .await
    }

    pub async fn play(
        &self,
        group: &GroupId,
        query: &str,
        requester: Requester,
    ) -> SessionResult<Track> {
        self.on_session(group, |s| {
            let requester = requester.clone();
            async move { s.play(query, requester).await }
        })
        .await
    }

    pub async fn pause(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.get(group) {
            Some(session) => session.pause().await,
            None => Err(SessionError::NothingPlaying),
        }
    }

    pub async fn resume(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.get(group) {
            Some(session) => session.resume().await,
            None => Err(SessionError::NotPaused),
        }
    }

    pub async fn skip(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.get(group) {
            Some(session) => session.skip().await,
            None => Err(SessionError::NothingPlaying),
        }
    }

    pub async fn stop(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.get(group) {
            Some(session) => session.stop().await,
            None => Ok(()),
        }
    }

    pub async fn remove(&self, group: &GroupId, position: usize) -> SessionResult<Track> {
        match self.registry.get(group) {
            Some(session) => session.remove(position).await,
            None => Err(SessionError::OutOfRange(format!(
                "position {} (queue length 0)",
                position
            ))),
        }
    }

    pub async fn shuffle(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.get(group) {
            Some(session) => session.shuffle().await,
            None => Ok(()),
        }
    }

    pub async fn set_volume(&self, group: &GroupId, volume: i64) -> SessionResult<()> {
        self.on_session(group, |s| async move { s.set_volume(volume).await })
            .await
    }

    pub async fn set_loop(&self, group: &GroupId, mode: LoopMode) -> SessionResult<()> {
        self.on_session(group, |s| async move { s.set_loop(mode).await })
            .await
    }

    /// Evicts the group's session and tears it down. No-op if there is none.
    pub async fn leave(&self, group: &GroupId) -> SessionResult<()> {
        match self.registry.remove(group) {
            Some(session) => session.leave(CloseReason::Left).await,
            None => Ok(()),
        }
    }

    pub fn current_track(&self, group: &GroupId) -> Option<Track> {
        self.registry.get(group).and_then(|s| s.current_track())
    }

    pub fn list_queue(&self, group: &GroupId) -> Vec<Track> {
        self.registry
            .get(group)
            .map(|s| s.list_queue())
            .unwrap_or_default()
    }

    pub fn status(&self, group: &GroupId) -> Option<SessionStatus> {
        self.registry.get(group).map(|s| s.status())
    }

    pub fn statuses(&self) -> Vec<SessionStatus> {
        self.registry.statuses()
    }

    /// Leaves every session idle for longer than the configured timeout.
    /// Returns how many were evicted.
    pub async fn sweep_idle(&self, now: Instant) -> usize {
        let evicted = self
            .registry
            .sweep_idle(self.deps.config.idle_timeout(), now);
        let count = evicted.len();
        leave_all(evicted, CloseReason::IdleTimeout).await;
        count
    }

    /// Leaves every session.
    pub async fn shutdown(&self) {
        let sessions = self.registry.drain();
        if !sessions.is_empty() {
            log::info!("[SessionService] Closing {} session(s)", sessions.len());
        }
        leave_all(sessions, CloseReason::Shutdown).await;
    }
}

/// Returns true if `result` failed only because `session` was closed by the
/// service while the command was queued or running.
fn torn_down_under<T>(session: &PlaybackSession, result: &SessionResult<T>) -> bool {
    match result {
        Err(SessionError::SessionClosed) => true,
        Err(SessionError::Cancelled) => {
            session.close_reason().is_some_and(CloseReason::is_eviction)
        }
        _ => false,
    }
}

async fn leave_all(sessions: Vec<PlaybackSession>, reason: CloseReason) {
    let results = join_all(sessions.iter().map(|s| s.leave(reason))).await;
    for (session, result) in sessions.iter().zip(results) {
        if let Err(e) = result {
            log::warn!("[SessionService] Failed to close {}: {}", session.group(), e);
        }
    }
}
