//! Retry logic for transient catalog errors.
//!
//! Provides backoff for catalog searches that fail with transient errors
//! (rate limits, timeouts). Permanent errors are returned immediately.

use std::time::Duration;

use super::{CatalogProvider, CatalogResult};
use crate::track::TrackCandidate;

/// Executes a catalog search, retrying transient failures.
///
/// `delays_ms` lists the wait before each retry; an empty slice disables
/// retries. The last transient error is returned once retries run out.
pub(crate) async fn search_with_retry(
    catalog: &dyn CatalogProvider,
    query: &str,
    delays_ms: &[u64],
) -> CatalogResult<Vec<TrackCandidate>> {
    let mut result = catalog.search(query).await;
    for (attempt, &delay_ms) in delays_ms.iter().enumerate() {
        match &result {
            Err(e) if e.is_transient() => {
                log::warn!("[Catalog] search '{}' transient error: {}", query, e);
                log::info!(
                    "[Catalog] Retrying search (attempt {}/{}) after {}ms",
                    attempt + 2,
                    delays_ms.len() + 1,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                result = catalog.search(query).await;
            }
            _ => break,
        }
    }
    result
}
