//! Ordered, index-addressable queue of pending tracks.
//!
//! The queue is owned by exactly one session actor, so it carries no
//! internal synchronization. The currently playing track is held by the
//! session and never duplicated into the queue.

use std::collections::VecDeque;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{SessionError, SessionResult};
use crate::track::Track;

#[derive(Debug, Default, Clone)]
pub struct TrackQueue {
    entries: VecDeque<Track>,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a track to the back of the queue.
    pub fn enqueue(&mut self, track: Track) {
        self.entries.push_back(track);
    }

    /// Removes the entry at `position`, renumbering the entries after it.
    ///
    /// Fails with `OutOfRange` without touching the queue when `position`
    /// is not within `[0, len)`.
    pub fn remove_at(&mut self, position: usize) -> SessionResult<Track> {
        let len = self.entries.len();
        self.entries.remove(position).ok_or_else(|| {
            SessionError::OutOfRange(format!("position {} (queue length {})", position, len))
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Shuffles the pending entries with the thread-local RNG.
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::rng());
    }

    /// Shuffles the pending entries with a caller-supplied RNG (Fisher-Yates).
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.entries.make_contiguous().shuffle(rng);
    }

    pub fn peek_next(&self) -> Option<&Track> {
        self.entries.front()
    }

    /// Removes and returns the front entry.
    pub fn pop_front(&mut self) -> SessionResult<Track> {
        self.entries.pop_front().ok_or(SessionError::EmptyQueue)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.entries.iter()
    }

    /// Returns a snapshot of the entries in play order.
    pub fn to_vec(&self) -> Vec<Track> {
        self.entries.iter().cloned().collect()
    }
}
