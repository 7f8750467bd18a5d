//! Per-group playback session.
//!
//! A [`PlaybackSession`] is a cheap, cloneable handle to an actor task that
//! owns all mutable state for one group: connection, playback state, the
//! current track, the queue, loop mode and volume. User commands and
//! transport events share one inbox, so they are applied strictly in arrival
//! order while independent groups run in parallel.
//!
//! Every command returns a typed [`SessionResult`]. After each message the
//! actor publishes a [`SessionStatus`] snapshot that read-only queries serve
//! without a round trip.

mod actor;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::catalog::CatalogProvider;
use crate::config::SessionConfig;
use crate::constants::MAX_VOLUME;
use crate::error::{SessionError, SessionResult};
use crate::events::{CloseReason, EventEmitter, SessionEvent};
use crate::runtime::TaskSpawner;
use crate::track::{GroupId, Track};
use crate::transport::{TransportConnector, TransportEvent, TransportTarget};
use crate::utils::now_millis;

use actor::SessionActor;

/// Transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Playback state. A current track exists exactly when this is `Playing`
/// or `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

/// What happens to a track when it finishes naturally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Move on to the next queued track.
    #[default]
    Off,
    /// Replay the same track.
    Track,
    /// Append the finished track to the back of the queue.
    Queue,
}

impl FromStr for LoopMode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "track" => Ok(Self::Track),
            "queue" => Ok(Self::Queue),
            _ => Err(SessionError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::Track => "track",
            Self::Queue => "queue",
        })
    }
}

/// The user a `play` is issued for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requester {
    /// Recorded on the queued track.
    pub id: String,
    /// Where to auto-join if the session is not connected yet (e.g. the
    /// voice channel the user is in).
    #[serde(default)]
    pub target: Option<TransportTarget>,
}

impl Requester {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target: None,
        }
    }

    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(TransportTarget(target.into()));
        self
    }
}

/// Read-only snapshot of a session, published after every message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub group: GroupId,
    pub connection: ConnectionState,
    pub playback: PlaybackState,
    pub volume: u8,
    pub loop_mode: LoopMode,
    pub current: Option<Track>,
    pub queue: Vec<Track>,
    /// Id of the most recent stream start.
    pub epoch: u64,
    /// Unix timestamp of the last user command (milliseconds).
    pub last_activity_ms: u64,
    #[serde(skip)]
    pub last_activity: Instant,
    /// Set while connected and idle.
    #[serde(skip)]
    pub idle_since: Option<Instant>,
}

impl SessionStatus {
    fn initial(session_id: Uuid, group: GroupId, volume: u8) -> Self {
        Self {
            session_id,
            group,
            connection: ConnectionState::Disconnected,
            playback: PlaybackState::Idle,
            volume,
            loop_mode: LoopMode::Off,
            current: None,
            queue: Vec::new(),
            epoch: 0,
            last_activity_ms: now_millis(),
            last_activity: Instant::now(),
            idle_since: None,
        }
    }

    /// Returns true if the session is connected, idle, and has been since
    /// at least `threshold` before `now`.
    pub fn is_idle_expired(&self, threshold: std::time::Duration, now: Instant) -> bool {
        self.connection == ConnectionState::Connected
            && self.playback == PlaybackState::Idle
            && self
                .idle_since
                .is_some_and(|since| now.saturating_duration_since(since) >= threshold)
    }
}

/// Capabilities and settings injected into every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub catalog: Arc<dyn CatalogProvider>,
    pub transport: Arc<dyn TransportConnector>,
    pub emitter: Arc<dyn EventEmitter>,
    pub config: Arc<SessionConfig>,
}

pub(crate) type Reply<T> = oneshot::Sender<SessionResult<T>>;

/// User commands, each carrying its reply channel.
pub(crate) enum Command {
    Join {
        target: TransportTarget,
        reply: Reply<()>,
    },
    Play {
        query: String,
        requester: Requester,
        reply: Reply<Track>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    /// `observed` is the stream the caller saw playing, if any.
    Skip {
        observed: Option<u64>,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Remove {
        position: usize,
        reply: Reply<Track>,
    },
    Shuffle {
        reply: Reply<()>,
    },
    SetVolume {
        volume: u8,
        reply: Reply<()>,
    },
    SetLoop {
        mode: LoopMode,
        reply: Reply<()>,
    },
    Status {
        reply: Reply<SessionStatus>,
    },
    Leave {
        reason: CloseReason,
        reply: Reply<()>,
    },
}

/// Everything a session actor consumes from its inbox.
pub(crate) enum SessionMessage {
    Command(Command),
    Transport {
        connection: u64,
        event: TransportEvent,
    },
}

struct SessionInner {
    id: Uuid,
    group: GroupId,
    tx: mpsc::UnboundedSender<SessionMessage>,
    status: Arc<RwLock<SessionStatus>>,
    /// Cancelled by `stop`/`leave` before they are queued; the actor installs
    /// a fresh token when it processes them.
    scope: Arc<Mutex<CancellationToken>>,
    /// Reason passed to the first `leave`.
    close_reason: Mutex<Option<CloseReason>>,
}

/// Handle to one group's playback session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

impl PlaybackSession {
    /// Creates the session and spawns its actor.
    pub fn spawn<S: TaskSpawner>(group: GroupId, deps: SessionDeps, spawner: &S) -> Self {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let status = Arc::new(RwLock::new(SessionStatus::initial(
            id,
            group.clone(),
            deps.config.default_volume,
        )));
        let scope = Arc::new(Mutex::new(CancellationToken::new()));

        deps.emitter.emit_session(SessionEvent::Created {
            group: group.clone(),
            session_id: id.to_string(),
            timestamp: now_millis(),
        });
        log::info!("[Session] Created session {} for group {}", id, group);

        let actor = SessionActor::new(
            id,
            group.clone(),
            deps,
            rx,
            tx.downgrade(),
            Arc::clone(&status),
            Arc::clone(&scope),
        );
        spawner.spawn(actor.run());

        Self {
            inner: Arc::new(SessionInner {
                id,
                group,
                tx,
                status,
                scope,
                close_reason: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn group(&self) -> &GroupId {
        &self.inner.group
    }

    /// Returns true if both handles refer to the same session.
    pub fn same_session(&self, other: &PlaybackSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true once the actor has stopped accepting commands.
    pub fn is_closed(&self) -> bool {
        self.inner.tx.is_closed()
    }

    /// Why the session was told to leave, if it has been.
    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.inner.close_reason.lock()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> SessionResult<T> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .tx
            .send(SessionMessage::Command(build(reply)))
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.unwrap_or(Err(SessionError::SessionClosed))
    }

    fn cancel_in_flight(&self) {
        self.inner.scope.lock().cancel();
    }

    /// Connects to `target`. Succeeds immediately if already connected.
    pub async fn join(&self, target: TransportTarget) -> SessionResult<()> {
        self.request(|reply| Command::Join { target, reply }).await
    }

    /// Searches the catalog, queues the best match, and starts playback if idle.
    ///
    /// Auto-joins the requester's target when not connected.
    pub async fn play(&self, query: &str, requester: Requester) -> SessionResult<Track> {
        let query = query.to_string();
        self.request(|reply| Command::Play {
            query,
            requester,
            reply,
        })
        .await
    }

    pub async fn pause(&self) -> SessionResult<()> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> SessionResult<()> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Skips the current track.
    ///
    /// The skip is applied in arrival order like any other command. The one
    /// exception: if the track playing at the time of this call has since
    /// ended on its own and nothing a user did has changed playback, the
    /// skip has already happened and nothing more is skipped.
    pub async fn skip(&self) -> SessionResult<()> {
        let observed = {
            let status = self.inner.status.read();
            (status.playback != PlaybackState::Idle).then_some(status.epoch)
        };
        self.request(|reply| Command::Skip { observed, reply })
            .await
    }

    /// Stops playback and clears the queue. Abandons any in-flight lookup.
    pub async fn stop(&self) -> SessionResult<()> {
        self.cancel_in_flight();
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Removes the queue entry at `position` (zero-based) and returns it.
    pub async fn remove(&self, position: usize) -> SessionResult<Track> {
        self.request(|reply| Command::Remove { position, reply })
            .await
    }

    pub async fn shuffle(&self) -> SessionResult<()> {
        self.request(|reply| Command::Shuffle { reply }).await
    }

    /// Sets the volume. Values outside 0-100 fail with `OutOfRange`.
    pub async fn set_volume(&self, volume: i64) -> SessionResult<()> {
        let volume = u8::try_from(volume)
            .ok()
            .filter(|v| *v <= MAX_VOLUME)
            .ok_or_else(|| {
                SessionError::OutOfRange(format!("volume {} (expected 0-{})", volume, MAX_VOLUME))
            })?;
        self.request(|reply| Command::SetVolume { volume, reply })
            .await
    }

    pub async fn set_loop(&self, mode: LoopMode) -> SessionResult<()> {
        self.request(|reply| Command::SetLoop { mode, reply }).await
    }

    /// Tears the session down. Calling it again is a no-op.
    pub async fn leave(&self, reason: CloseReason) -> SessionResult<()> {
        self.inner.close_reason.lock().get_or_insert(reason);
        self.cancel_in_flight();
        match self.request(|reply| Command::Leave { reason, reply }).await {
            Err(SessionError::SessionClosed) => Ok(()),
            other => other,
        }
    }

    pub fn current_track(&self) -> Option<Track> {
        self.inner.status.read().current.clone()
    }

    pub fn list_queue(&self) -> Vec<Track> {
        self.inner.status.read().queue.clone()
    }

    /// Returns the last published snapshot.
    pub fn status(&self) -> SessionStatus {
        self.inner.status.read().clone()
    }

    /// Returns a snapshot taken after every message queued before this call
    /// has been applied.
    pub async fn fetch_status(&self) -> SessionResult<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.inner.id)
            .field("group", &self.inner.group)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_mode_parses_case_insensitively() {
        assert_eq!("off".parse::<LoopMode>().unwrap(), LoopMode::Off);
        assert_eq!(" Track ".parse::<LoopMode>().unwrap(), LoopMode::Track);
        assert_eq!("QUEUE".parse::<LoopMode>().unwrap(), LoopMode::Queue);
    }

    #[test]
    fn unknown_loop_mode_is_invalid() {
        let err = "shuffle".parse::<LoopMode>().unwrap_err();
        assert_eq!(err, SessionError::InvalidMode("shuffle".into()));
    }

    #[test]
    fn idle_expiry_requires_connected_idle() {
        let now = Instant::now();
        let mut status = SessionStatus::initial(Uuid::new_v4(), GroupId::from("g"), 80);
        status.idle_since = Some(now);
        let later = now + std::time::Duration::from_secs(10);

        assert!(!status.is_idle_expired(std::time::Duration::from_secs(5), later));

        status.connection = ConnectionState::Connected;
        assert!(status.is_idle_expired(std::time::Duration::from_secs(5), later));
        assert!(!status.is_idle_expired(std::time::Duration::from_secs(20), later));

        status.playback = PlaybackState::Paused;
        assert!(!status.is_idle_expired(std::time::Duration::from_secs(5), later));
    }

    #[test]
    fn requester_target_is_optional() {
        let requester: Requester = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert!(requester.target.is_none());
        let requester = Requester::new("u1").with_target("voice-1");
        assert_eq!(requester.target, Some(TransportTarget("voice-1".into())));
    }
}
