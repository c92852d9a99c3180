//! Time-to-live policy shared by every durable-tier reader.

use std::time::Duration;

use crate::domain::entities::CacheEntry;

/// Default maximum age of a durable entry (24 hours).
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Decides whether a durable entry is expired.
///
/// The lookup path and the sweep both go through [`ExpiryPolicy::is_expired`]
/// so they can never disagree about an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    ttl: Duration,
}

impl ExpiryPolicy {
    /// Creates a policy with the given time-to-live.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Returns the configured time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns true once `now - stored_at >= ttl`, both in epoch millis.
    ///
    /// Entries stamped in the future (clock skew) are never expired.
    #[must_use]
    pub fn is_expired_at(&self, stored_at: i64, now: i64) -> bool {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        now.saturating_sub(stored_at) >= ttl_ms
    }

    /// Returns true if the entry must be treated as absent at `now`.
    #[must_use]
    pub fn is_expired(&self, entry: &CacheEntry, now: i64) -> bool {
        self.is_expired_at(entry.stored_at, now)
    }
}

impl Default for ExpiryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
