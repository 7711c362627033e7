//! Process-wide configuration for the live session sync core.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Default cadence for periodic coalesced `update` signals, in milliseconds.
pub const DEFAULT_UPDATE_INTERVAL_MS: u64 = 5_000;

/// Default TTL for cached role lookups.
pub const DEFAULT_ROLE_CACHE_TTL: Duration = Duration::from_secs(5);

/// Default TTL for cached role lookup failures. Kept short so a flapping
/// host lookup is retried quickly instead of poisoning the cache.
pub const DEFAULT_ROLE_FAILURE_TTL: Duration = Duration::from_secs(1);

/// Process-global update interval, read once at synchronizer construction.
static UPDATE_INTERVAL_MS: AtomicU64 = AtomicU64::new(DEFAULT_UPDATE_INTERVAL_MS);

/// Get the current process-global update interval.
#[must_use]
pub fn update_interval() -> Duration {
    Duration::from_millis(UPDATE_INTERVAL_MS.load(Ordering::Relaxed))
}

/// Set the process-global update interval.
///
/// Only affects synchronizers constructed after the call; already-running
/// synchronizers keep the interval they were created with.
pub fn set_update_interval(interval: Duration) {
    let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
    UPDATE_INTERVAL_MS.store(millis, Ordering::Relaxed);
}

/// Role cache configuration.
#[derive(Debug, Clone, Copy)]
pub struct RoleCacheConfig {
    /// How long successful lookups stay cached.
    pub ttl: Duration,
    /// How long failed lookups resolve to "no roles" before a retry.
    pub failure_ttl: Duration,
}

impl Default for RoleCacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_ROLE_CACHE_TTL,
            failure_ttl: DEFAULT_ROLE_FAILURE_TTL,
        }
    }
}
