//! In-memory catalog backed by a fixed track library.
//!
//! Used by the standalone server (library loaded from configuration) and by
//! tests. Matching is case-insensitive: every query word must appear in the
//! track's artist or title, and results are ranked by how closely the title
//! matches the whole query.

use std::collections::HashSet;

use async_trait::async_trait;

use super::{CatalogError, CatalogProvider, CatalogResult};
use crate::track::{SourceRef, StreamHandle, TrackCandidate};

/// Maximum number of candidates returned by a single search.
const MAX_RESULTS: usize = 10;

pub struct LibraryCatalog {
    tracks: Vec<TrackCandidate>,
    sources: HashSet<SourceRef>,
}

impl LibraryCatalog {
    pub fn new(tracks: Vec<TrackCandidate>) -> Self {
        let sources = tracks.iter().map(|t| t.source.clone()).collect();
        Self { tracks, sources }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Scores a candidate against a lowercase query; `None` means no match.
    fn score(candidate: &TrackCandidate, query: &str, words: &[&str]) -> Option<u8> {
        let title = candidate.title.to_lowercase();
        let artist = candidate.artist.to_lowercase();

        if !words
            .iter()
            .all(|w| title.contains(w) || artist.contains(w))
        {
            return None;
        }

        let score = if title == query {
            0
        } else if title.starts_with(query) {
            1
        } else if title.contains(query) {
            2
        } else if format!("{} {}", artist, title).contains(query) {
            3
        } else {
            4
        };
        Some(score)
    }
}

#[async_trait]
impl CatalogProvider for LibraryCatalog {
    async fn search(&self, query: &str) -> CatalogResult<Vec<TrackCandidate>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Err(CatalogError::Permanent("empty query".into()));
        }
        let words: Vec<&str> = query.split_whitespace().collect();

        let mut ranked: Vec<(u8, usize)> = self
            .tracks
            .iter()
            .enumerate()
            .filter_map(|(i, t)| Self::score(t, &query, &words).map(|s| (s, i)))
            .collect();
        // Stable on library order for equal scores.
        ranked.sort_unstable();

        Ok(ranked
            .into_iter()
            .take(MAX_RESULTS)
            .map(|(_, i)| self.tracks[i].clone())
            .collect())
    }

    async fn resolve_source(&self, source: &SourceRef) -> CatalogResult<StreamHandle> {
        if self.sources.contains(source) {
            Ok(StreamHandle(source.0.clone()))
        } else {
            Err(CatalogError::Permanent(format!(
                "unknown source: {}",
                source.0
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, title: &str, artist: &str) -> TrackCandidate {
        TrackCandidate {
            id: id.to_string(),
            title: title.to_string(),
            artist: artist.to_string(),
            duration: None,
            source: SourceRef(format!("lib://{}", id)),
        }
    }

    fn library() -> LibraryCatalog {
        LibraryCatalog::new(vec![
            entry("1", "Blue Monday Remix", "New Order"),
            entry("2", "Blue Monday", "New Order"),
            entry("3", "Monday Morning", "Fleetwood Mac"),
            entry("4", "Ceremony", "New Order"),
        ])
    }

    #[tokio::test]
    async fn exact_title_ranks_first() {
        let results = library().search("blue monday").await.unwrap();
        let ids: Vec<_> = results.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[tokio::test]
    async fn matches_on_artist_words() {
        let results = library().search("new order ceremony").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "4");
    }

    #[tokio::test]
    async fn no_match_returns_empty_list() {
        let results = library().search("nonexistent").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn blank_query_is_permanent_error() {
        let err = library().search("   ").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn resolves_only_known_sources() {
        let catalog = library();
        let handle = catalog
            .resolve_source(&SourceRef("lib://2".into()))
            .await
            .unwrap();
        assert_eq!(handle.0, "lib://2");

        assert!(catalog
            .resolve_source(&SourceRef("lib://99".into()))
            .await
            .is_err());
    }
}
