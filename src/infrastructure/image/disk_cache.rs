//! Disk-based durable store for raw image bytes, persisted across sessions.
//!
//! Each entry is two files named after the URL hash: `<id>.img` holds the
//! payload and `<id>.meta` holds `{url, stored_at, size}` as JSON. The
//! metadata file is written last, so its presence commits the entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, trace, warn};

use crate::domain::entities::{CacheEntry, ImageId, StoreStats};
use crate::domain::ports::{CacheError, CacheResult, Clock};
use crate::domain::services::ExpiryPolicy;

const CONTENT_EXT: &str = "img";
const META_EXT: &str = "meta";
const TMP_EXT: &str = "tmp";

#[derive(Debug, Serialize, Deserialize)]
struct StoredMetadata {
    url: String,
    stored_at: i64,
    size: u64,
}

/// Durable tier of the image cache, keyed by source URL.
///
/// The backing directory is created lazily on first use; concurrent first
/// users all wait on the same initialization. Writes and conditional deletes
/// are serialized, so a delete never lands between the two files of a `put`.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    opened: OnceCell<()>,
    writes: Mutex<()>,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DiskImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskImageCache")
            .field("cache_dir", &self.cache_dir)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl DiskImageCache {
    /// Creates a store rooted at `cache_dir`. Nothing touches the disk until
    /// the first operation.
    #[must_use]
    pub fn new(cache_dir: PathBuf, policy: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir,
            opened: OnceCell::new(),
            writes: Mutex::new(()),
            policy,
            clock,
        }
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the expiry policy applied by every reader.
    #[must_use]
    pub const fn policy(&self) -> ExpiryPolicy {
        self.policy
    }

    /// Returns true if an entry written at `stored_at` must be treated as
    /// absent right now.
    #[must_use]
    pub fn is_expired(&self, stored_at: i64) -> bool {
        self.policy.is_expired_at(stored_at, self.clock.now_millis())
    }

    /// Establishes the store, creating the backing directory if absent.
    ///
    /// Idempotent. A failed attempt is retried by the next caller.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be created.
    pub async fn open(&self) -> CacheResult<()> {
        self.opened
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.cache_dir).await.map_err(|e| {
                    CacheError::store(format!(
                        "Failed to create cache dir {}: {e}",
                        self.cache_dir.display()
                    ))
                })?;
                debug!(path = %self.cache_dir.display(), "Opened durable image store");
                Ok::<(), CacheError>(())
            })
            .await
            .map(|_| ())
    }

    fn content_path(&self, id: &ImageId) -> PathBuf {
        self.cache_dir.join(format!("{}.{CONTENT_EXT}", id.as_str()))
    }

    fn meta_path(&self, id: &ImageId) -> PathBuf {
        self.cache_dir.join(format!("{}.{META_EXT}", id.as_str()))
    }

    /// Returns the live entry for `url`.
    ///
    /// An expired entry is deleted on the spot and reported as absent. Store
    /// failures are logged and also reported as absent.
    pub async fn get(&self, url: &str) -> Option<CacheEntry> {
        match self.try_get(url).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(url = %url, error = %e, "Durable store read failed, treating as miss");
                None
            }
        }
    }

    async fn try_get(&self, url: &str) -> CacheResult<Option<CacheEntry>> {
        self.open().await?;
        let id = ImageId::from_url(url);

        let Some(meta) = self.read_metadata(&id).await? else {
            trace!(url = %url, "Disk cache miss");
            return Ok(None);
        };

        if meta.url != url {
            debug!(url = %url, stored = %meta.url, "Disk cache key collision");
            return Ok(None);
        }

        if self.is_expired(meta.stored_at) {
            debug!(url = %url, stored_at = meta.stored_at, "Disk cache entry expired");
            self.discard(url).await;
            return Ok(None);
        }

        let content = match fs::read(self.content_path(&id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(url = %url, "Disk cache metadata without content");
                self.discard(url).await;
                return Ok(None);
            }
            Err(e) => {
                return Err(CacheError::store(format!("Failed to read cache file: {e}")));
            }
        };

        if content.len() as u64 != meta.size {
            warn!(
                url = %url,
                expected = meta.size,
                actual = content.len(),
                "Disk cache entry truncated"
            );
            self.discard(url).await;
            return Ok(None);
        }

        trace!(url = %url, size = content.len(), "Disk cache hit");
        Ok(Some(CacheEntry::new(
            meta.url,
            Bytes::from(content),
            meta.stored_at,
        )))
    }

    async fn read_metadata(&self, id: &ImageId) -> CacheResult<Option<StoredMetadata>> {
        let path = self.meta_path(id);
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CacheError::store(format!("Failed to read metadata: {e}")));
            }
        };

        match serde_json::from_slice(&raw) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt disk cache metadata, removing");
                self.remove_files(id).await?;
                Ok(None)
            }
        }
    }

    /// Upserts the entry for `url`, stamped with the current time.
    ///
    /// # Errors
    /// Returns error if either file cannot be written.
    pub async fn put(&self, url: &str, content: &[u8]) -> CacheResult<()> {
        self.open().await?;
        let id = ImageId::from_url(url);
        let meta = StoredMetadata {
            url: url.to_string(),
            stored_at: self.clock.now_millis(),
            size: content.len() as u64,
        };
        let meta_bytes = serde_json::to_vec(&meta)
            .map_err(|e| CacheError::store(format!("Failed to encode metadata: {e}")))?;

        let _writes = self.writes.lock().await;
        write_atomic(&self.content_path(&id), content).await?;
        write_atomic(&self.meta_path(&id), &meta_bytes).await?;

        debug!(url = %url, id = %id, size = content.len(), "Stored image in disk cache");
        Ok(())
    }

    /// Removes the entry for `url`; a no-op if absent.
    ///
    /// # Errors
    /// Returns error if an existing file cannot be removed.
    pub async fn delete(&self, url: &str) -> CacheResult<()> {
        self.open().await?;
        let _writes = self.writes.lock().await;
        let id = ImageId::from_url(url);
        self.remove_files(&id).await?;
        debug!(url = %url, "Evicted from disk cache");
        Ok(())
    }

    /// Removes the entry for `url` if, re-read now, it is expired or its
    /// content is missing or truncated. Returns true if it was removed.
    ///
    /// An entry rewritten since the caller last looked at it is kept.
    ///
    /// # Errors
    /// Returns error if the entry cannot be read or removed.
    pub async fn delete_if_stale(&self, url: &str) -> CacheResult<bool> {
        self.open().await?;
        let _writes = self.writes.lock().await;
        let id = ImageId::from_url(url);

        let Some(meta) = self.read_metadata(&id).await? else {
            return Ok(false);
        };
        if meta.url != url {
            return Ok(false);
        }

        let stale = self.is_expired(meta.stored_at)
            || self.content_len(&id).await? != Some(meta.size);
        if stale {
            self.remove_files(&id).await?;
            debug!(url = %url, stored_at = meta.stored_at, "Evicted stale entry from disk cache");
        }
        Ok(stale)
    }

    async fn discard(&self, url: &str) {
        if let Err(e) = self.delete_if_stale(url).await {
            warn!(url = %url, error = %e, "Failed to evict from disk cache");
        }
    }

    async fn content_len(&self, id: &ImageId) -> CacheResult<Option<u64>> {
        match fs::metadata(self.content_path(id)).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::store(format!("Failed to stat cache file: {e}"))),
        }
    }

    async fn remove_files(&self, id: &ImageId) -> CacheResult<()> {
        // Metadata first: without it the content file is unreachable.
        for path in [self.meta_path(id), self.content_path(id)] {
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(CacheError::store(format!(
                        "Failed to remove {}: {e}",
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Starts a one-shot scan over every stored entry, expired ones included.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened or listed.
    pub async fn scan_all(&self) -> CacheResult<StoreScan<'_>> {
        self.open().await?;
        let entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::store(format!("Failed to read cache dir: {e}")))?;
        Ok(StoreScan {
            store: self,
            entries: Some(entries),
        })
    }

    /// Counts intact entries and their payload bytes with a full scan of
    /// the metadata.
    ///
    /// # Errors
    /// Returns error if the store cannot be scanned.
    pub async fn stats(&self) -> CacheResult<StoreStats> {
        let mut scan = self.scan_all().await?;
        let mut stats = StoreStats::default();
        while let Some(record) = scan.next_record().await {
            if record.intact {
                stats.count += 1;
                stats.total_bytes += record.size;
            }
        }
        Ok(stats)
    }

    /// Removes content files that have no metadata and leftover temporary
    /// files, both left behind by an interrupted `put`. Returns the number
    /// of files removed.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn remove_orphans(&self) -> CacheResult<usize> {
        self.open().await?;
        let _writes = self.writes.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::store(format!("Failed to read cache dir: {e}")))?;

        let mut removed = 0usize;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::store(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            let orphaned = if has_extension(&path, &[TMP_EXT]) {
                true
            } else if has_extension(&path, &[CONTENT_EXT]) {
                !fs::try_exists(path.with_extension(META_EXT))
                    .await
                    .unwrap_or(true)
            } else {
                false
            };
            if !orphaned {
                continue;
            }

            match fs::remove_file(&path).await {
                Ok(()) => {
                    trace!(path = %path.display(), "Removed orphaned cache file");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove orphaned cache file"),
            }
        }
        Ok(removed)
    }

    /// Deletes every entry.
    ///
    /// # Errors
    /// Returns error if the cache directory cannot be read.
    pub async fn clear(&self) -> CacheResult<()> {
        self.open().await?;
        let _writes = self.writes.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::store(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::store(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if has_extension(&path, &[CONTENT_EXT, META_EXT, TMP_EXT])
                && let Err(e) = fs::remove_file(&path).await
                && e.kind() != ErrorKind::NotFound
            {
                warn!(path = %path.display(), error = %e, "Failed to remove cache file");
            }
        }
        debug!("Cleared disk cache");
        Ok(())
    }
}

/// Metadata of one stored entry, as seen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    /// Source URL.
    pub url: String,
    /// Write time in milliseconds since the Unix epoch.
    pub stored_at: i64,
    /// Payload size recorded at write time.
    pub size: u64,
    /// False when the content file is missing or its length differs from
    /// `size`.
    pub intact: bool,
}

/// Lazy, finite, one-shot sequence over the entries of a [`DiskImageCache`].
///
/// Unreadable metadata is skipped with a warning.
pub struct StoreScan<'a> {
    store: &'a DiskImageCache,
    entries: Option<fs::ReadDir>,
}

impl StoreScan<'_> {
    /// Returns the next record without reading its payload, or `None` once
    /// the scan is exhausted.
    pub async fn next_record(&mut self) -> Option<ScanRecord> {
        loop {
            let entries = self.entries.as_mut()?;
            let dir_entry = match entries.next_entry().await {
                Ok(Some(dir_entry)) => dir_entry,
                Ok(None) => {
                    self.entries = None;
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "Disk cache scan aborted");
                    self.entries = None;
                    return None;
                }
            };

            let path = dir_entry.path();
            if !has_extension(&path, &[META_EXT]) {
                continue;
            }
            if let Some(record) = self.record(&path).await {
                return Some(record);
            }
        }
    }

    /// Returns the next intact entry with its payload, or `None` once the
    /// scan is exhausted.
    pub async fn next_entry(&mut self) -> Option<CacheEntry> {
        loop {
            let record = self.next_record().await?;
            if !record.intact {
                trace!(url = %record.url, "Skipping damaged entry");
                continue;
            }
            let id = ImageId::from_url(&record.url);
            match fs::read(self.store.content_path(&id)).await {
                Ok(content) if content.len() as u64 == record.size => {
                    return Some(CacheEntry::new(
                        record.url,
                        Bytes::from(content),
                        record.stored_at,
                    ));
                }
                Ok(_) => trace!(url = %record.url, "Skipping entry rewritten during scan"),
                Err(e) => trace!(url = %record.url, error = %e, "Skipping entry without content"),
            }
        }
    }

    async fn record(&self, meta_path: &Path) -> Option<ScanRecord> {
        let raw = fs::read(meta_path).await.ok()?;
        let meta: StoredMetadata = match serde_json::from_slice(&raw) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %meta_path.display(), error = %e, "Skipping corrupt metadata");
                return None;
            }
        };
        let id = ImageId::from_url(&meta.url);
        let content_len = self.store.content_len(&id).await.ok().flatten();
        Some(ScanRecord {
            intact: content_len == Some(meta.size),
            url: meta.url,
            stored_at: meta.stored_at,
            size: meta.size,
        })
    }
}

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| exts.contains(&ext))
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".");
    tmp.push(TMP_EXT);
    let tmp = PathBuf::from(tmp);
    let mut file = fs::File::create(&tmp)
        .await
        .map_err(|e| CacheError::store(format!("Failed to create cache file: {e}")))?;

    file.write_all(bytes)
        .await
        .map_err(|e| CacheError::store(format!("Failed to write cache file: {e}")))?;

    file.flush()
        .await
        .map_err(|e| CacheError::store(format!("Failed to flush cache file: {e}")))?;
    drop(file);

    fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::store(format!("Failed to commit cache file: {e}")))
}
