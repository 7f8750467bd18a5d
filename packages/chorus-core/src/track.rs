//! Track and group identity value types.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of an isolated playback scope (e.g. one chat community).
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for GroupId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque catalog reference used to obtain a streamable source.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub String);

/// Opaque handle a transport can stream, produced by resolving a [`SourceRef`].
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamHandle(pub String);

/// One ranked search result returned by a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackCandidate {
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Unknown for live streams and some sources.
    #[serde(default, with = "duration_secs")]
    pub duration: Option<Duration>,
    pub source: SourceRef,
}

/// Immutable description of one playable item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    id: String,
    title: String,
    artist: String,
    #[serde(with = "duration_secs")]
    duration: Option<Duration>,
    requester: String,
    #[serde(skip)]
    source: SourceRef,
}

impl Track {
    /// Builds a track from a catalog candidate chosen on behalf of `requester`.
    pub fn from_candidate(candidate: TrackCandidate, requester: impl Into<String>) -> Self {
        Self {
            id: candidate.id,
            title: candidate.title,
            artist: candidate.artist,
            duration: candidate.duration,
            requester: requester.into(),
            source: candidate.source,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }
}

/// Serializes `Option<Duration>` as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}
