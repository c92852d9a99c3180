//! Domain types for cached cover images.

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};

use super::LocalHandle;

/// Stable storage key for a source URL.
/// Generated from a hash of the URL so it is safe to use as a file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    /// Creates an `ImageId` from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A record of the durable tier: the raw payload fetched for one URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Remote source identifier, the primary key.
    pub url: String,
    /// Raw fetched payload.
    pub content: Bytes,
    /// Write time in milliseconds since the Unix epoch.
    pub stored_at: i64,
}

impl CacheEntry {
    /// Creates an entry stamped with the given write time.
    #[must_use]
    pub fn new(url: impl Into<String>, content: Bytes, stored_at: i64) -> Self {
        Self {
            url: url.into(),
            content,
            stored_at,
        }
    }

    /// Returns the storage key for this entry.
    #[must_use]
    pub fn id(&self) -> ImageId {
        ImageId::from_url(&self.url)
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Returns the write time as a timestamp, if representable.
    #[must_use]
    pub fn stored_at_utc(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.stored_at).single()
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Already hydrated in this process.
    MemoryCache,
    /// Hydrated from the durable store.
    DiskCache,
    /// Downloaded from network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully resolved image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    /// The source URL that was requested.
    pub url: String,
    /// Handle installed in the memory tier.
    pub handle: LocalHandle,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// Durable tier statistics, computed by a full scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored entries.
    pub count: usize,
    /// Sum of all payload sizes.
    pub total_bytes: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} entries, {} bytes", self.count, self.total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_id_from_url() {
        let url = "https://covers.openlibrary.org/b/id/240727-L.jpg";
        let id = ImageId::from_url(url);
        assert_eq!(id.as_str().len(), 32);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_image_id_consistency() {
        let url = "https://example.com/cover.png";
        assert_eq!(ImageId::from_url(url), ImageId::from_url(url));
        assert_ne!(
            ImageId::from_url(url),
            ImageId::from_url("https://example.com/other.png")
        );
    }

    #[test]
    fn test_entry_size_and_timestamp() {
        let entry = CacheEntry::new(
            "https://x/cover.jpg",
            Bytes::from_static(b"abcd"),
            1_700_000_000_000,
        );
        assert_eq!(entry.size(), 4);
        assert_eq!(
            entry.stored_at_utc().map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
        assert_eq!(entry.id(), ImageId::from_url("https://x/cover.jpg"));
    }
}
