//! Process-wide map from group to its playback session.
//!
//! Uses `DashMap` so operations on different groups only contend when they
//! hash to the same shard, and never for longer than one map operation.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::session::{PlaybackSession, SessionStatus};
use crate::track::GroupId;

/// At most one live [`PlaybackSession`] per group.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GroupId, PlaybackSession>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `group`, creating it with `factory` if absent.
    ///
    /// Atomic per group: concurrent callers for the same group all receive
    /// the same instance and `factory` runs once. A registered session whose
    /// actor has already stopped is replaced.
    pub fn get_or_create<F>(&self, group: &GroupId, factory: F) -> PlaybackSession
    where
        F: FnOnce() -> PlaybackSession,
    {
        match self.sessions.entry(group.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_closed() {
                    log::debug!("[Registry] Replacing closed session for {}", group);
                    let session = factory();
                    entry.insert(session.clone());
                    session
                } else {
                    entry.get().clone()
                }
            }
            Entry::Vacant(entry) => entry.insert(factory()).value().clone(),
        }
    }

    pub fn get(&self, group: &GroupId) -> Option<PlaybackSession> {
        self.sessions.get(group).map(|r| r.value().clone())
    }

    /// Evicts and returns the session for `group` so the caller can tear it down.
    pub fn remove(&self, group: &GroupId) -> Option<PlaybackSession> {
        self.sessions.remove(group).map(|(_, session)| session)
    }

    /// Evicts `session` if it is still the one registered for `group`.
    pub fn remove_if_same(&self, group: &GroupId, session: &PlaybackSession) -> bool {
        self.sessions
            .remove_if(group, |_, current| current.same_session(session))
            .is_some()
    }

    /// Evicts sessions that have been connected and idle for at least
    /// `threshold` as of `now`, returning them for the caller to `leave()`.
    ///
    /// Candidates are collected first, then each is removed with the
    /// predicate re-checked under its entry lock, so a session that resumed
    /// playback in between is kept.
    pub fn sweep_idle(&self, threshold: Duration, now: Instant) -> Vec<PlaybackSession> {
        let candidates: Vec<GroupId> = self
            .sessions
            .iter()
            .filter(|r| r.value().status().is_idle_expired(threshold, now))
            .map(|r| r.key().clone())
            .collect();

        let evicted: Vec<PlaybackSession> = candidates
            .into_iter()
            .filter_map(|group| {
                self.sessions
                    .remove_if(&group, |_, session| {
                        session.status().is_idle_expired(threshold, now)
                    })
                    .map(|(_, session)| session)
            })
            .collect();

        if !evicted.is_empty() {
            log::info!("[Registry] Evicted {} idle session(s)", evicted.len());
        }
        evicted
    }

    /// Evicts every session (used at shutdown).
    pub fn drain(&self) -> Vec<PlaybackSession> {
        let groups: Vec<GroupId> = self.sessions.iter().map(|r| r.key().clone()).collect();
        groups
            .into_iter()
            .filter_map(|group| self.remove(&group))
            .collect()
    }

    /// Snapshots of all registered sessions, ordered by group.
    pub fn statuses(&self) -> Vec<SessionStatus> {
        let mut statuses: Vec<SessionStatus> =
            self.sessions.iter().map(|r| r.value().status()).collect();
        statuses.sort_by(|a, b| a.group.cmp(&b.group));
        statuses
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
