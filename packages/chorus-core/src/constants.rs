//! Fixed constants shared across the crate.

/// Service identifier reported by the health endpoint.
pub const SERVICE_ID: &str = "chorus";

/// Highest accepted volume.
pub const MAX_VOLUME: u8 = 100;

/// Default backoff before each catalog search retry (milliseconds).
pub const DEFAULT_CATALOG_RETRY_DELAYS_MS: [u64; 3] = [200, 500, 1000];
