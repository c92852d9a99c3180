//! Port definitions for image caching.

use async_trait::async_trait;
use bytes::Bytes;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors that can occur during cache operations.
///
/// `Clone` so that one failure can be handed to every caller waiting on the
/// same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(missing_docs)]
pub enum CacheError {
    /// The durable store could not be opened, read or written.
    #[error("durable store unavailable: {0}")]
    StoreUnavailable(String),
    /// Network fetch failed or returned a non-success status.
    #[error("failed to load image {url}: {reason}")]
    FetchFailure { url: String, reason: String },
    /// The fetched body could not be turned into a local handle.
    #[error("failed to materialize image {url}: {reason}")]
    MaterializationFailure { url: String, reason: String },
}

impl CacheError {
    /// Creates store unavailable error.
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    /// Creates fetch failure error.
    #[must_use]
    pub fn fetch(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FetchFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates materialization failure error.
    #[must_use]
    pub fn materialization(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MaterializationFailure {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Returns the source URL of a load failure.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::FetchFailure { url, .. } | Self::MaterializationFailure { url, .. } => Some(url),
            Self::StoreUnavailable(_) => None,
        }
    }

    /// Returns whether this is a failure surfaced to callers of a load.
    #[must_use]
    pub const fn is_load_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailure { .. } | Self::MaterializationFailure { .. }
        )
    }
}

/// Port for downloading remote image content.
/// Implementations must be thread-safe.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Downloads the raw body behind `url`.
    ///
    /// Non-success statuses are reported as [`CacheError::FetchFailure`].
    async fn fetch(&self, url: &str) -> CacheResult<Bytes>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;

    use parking_lot::Mutex;

    /// Smallest byte sequence recognised as a PNG.
    pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR cover";
    /// Smallest byte sequence recognised as a JPEG.
    pub const JPEG_BYTES: &[u8] = b"\xff\xd8\xff\xe0\0\x10JFIF cover";

    /// Fetcher that serves canned bodies and counts calls per URL.
    pub struct StubFetcher {
        calls: Mutex<HashMap<String, usize>>,
        bodies: Mutex<HashMap<String, Bytes>>,
        failing: Mutex<HashSet<String>>,
        delay: Duration,
    }

    impl StubFetcher {
        /// Creates a fetcher answering every URL with [`PNG_BYTES`].
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(HashMap::new()),
                bodies: Mutex::new(HashMap::new()),
                failing: Mutex::new(HashSet::new()),
                delay: Duration::ZERO,
            }
        }

        /// Delays every response, keeping requests in flight.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        /// Serves `body` for `url`.
        pub fn with_body(self, url: &str, body: &'static [u8]) -> Self {
            self.bodies
                .lock()
                .insert(url.to_string(), Bytes::from_static(body));
            self
        }

        /// Makes every fetch of `url` fail.
        pub fn failing(self, url: &str) -> Self {
            self.failing.lock().insert(url.to_string());
            self
        }

        /// Lets `url` succeed again.
        pub fn recover(&self, url: &str) {
            self.failing.lock().remove(url);
        }

        /// Number of fetches issued for `url`.
        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }

        /// Number of fetches issued for any URL.
        pub fn total_calls(&self) -> usize {
            self.calls.lock().values().sum()
        }
    }

    impl Default for StubFetcher {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ImageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> CacheResult<Bytes> {
            *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if self.failing.lock().contains(url) {
                return Err(CacheError::fetch(url, "HTTP 404 Not Found"));
            }

            Ok(self
                .bodies
                .lock()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Bytes::from_static(PNG_BYTES)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_failures_carry_url() {
        let err = CacheError::fetch("https://x/a.jpg", "HTTP 500");
        assert_eq!(err.url(), Some("https://x/a.jpg"));
        assert!(err.is_load_failure());

        let err = CacheError::materialization("https://x/b.jpg", "empty body");
        assert_eq!(err.url(), Some("https://x/b.jpg"));
        assert!(err.is_load_failure());
    }

    #[test]
    fn test_store_error_is_not_load_failure() {
        let err = CacheError::store("disk full");
        assert_eq!(err.url(), None);
        assert!(!err.is_load_failure());
        assert_eq!(err.to_string(), "durable store unavailable: disk full");
    }
}
