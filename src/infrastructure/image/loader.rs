//! Async image cache orchestrator.
//!
//! Implements a two-tier cache in front of the network: Memory -> Disk -> Network.
//! Concurrent requests for one URL attach to a single in-flight resolution.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{
    ImageSource, LoadedImage, LocalHandle, MaterializedImage, StoreStats,
};
use crate::domain::ports::{CacheError, CacheResult, ImageFetcher};
use crate::domain::services::{DEFAULT_TTL, ExpiryPolicy};
use crate::infrastructure::clock::SystemClock;

use super::disk_cache::DiskImageCache;
use super::handles::{HandleRegistry, ScopedHandle, materialize};
use super::http_fetcher::HttpImageFetcher;
use super::memory_cache::{CacheStats, MemoryImageCache};
use super::sweep::sweep_expired;

type PendingLoad = Shared<BoxFuture<'static, CacheResult<LoadedImage>>>;

/// Configuration for the image cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCacheConfig {
    /// Durable store directory. Defaults to the platform cache directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Maximum age of a durable entry, in hours.
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    /// Maximum concurrent downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// User agent sent with every download.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_ttl_hours() -> u64 {
    DEFAULT_TTL.as_secs() / 3600
}

fn default_max_concurrent_downloads() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_hours: default_ttl_hours(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl ImageCacheConfig {
    /// Returns the durable entry time-to-live.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours.saturating_mul(3600))
    }

    /// Returns the configured directory, or the platform default.
    #[must_use]
    pub fn effective_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(dirs_cache_path)
    }
}

/// Returns the default cache directory path.
fn dirs_cache_path() -> PathBuf {
    directories::ProjectDirs::from("org", "covercache", "covercache").map_or_else(
        || {
            std::env::temp_dir()
                .join("covercache")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}

/// Two-tier cache of remote cover images.
///
/// Cheap to clone; every clone refers to the same tiers. The component that
/// installs a handle into the memory tier (this cache) is the only one that
/// revokes it, and only on [`ImageCache::clear_cache`].
#[derive(Clone)]
pub struct ImageCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    memory: MemoryImageCache,
    disk: DiskImageCache,
    handles: Arc<HandleRegistry>,
    fetcher: Arc<dyn ImageFetcher>,
    pending: Mutex<HashMap<String, PendingLoad>>,
    startup_sweep: Mutex<Option<JoinHandle<usize>>>,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("disk", &self.inner.disk)
            .field("hydrated", &self.inner.memory.len())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Creates the cache and starts the TTL sweep of the durable store in
    /// the background.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(disk: DiskImageCache, fetcher: Arc<dyn ImageFetcher>) -> Self {
        let inner = Arc::new(CacheInner {
            memory: MemoryImageCache::new(),
            disk,
            handles: Arc::new(HandleRegistry::new()),
            fetcher,
            pending: Mutex::new(HashMap::new()),
            startup_sweep: Mutex::new(None),
        });

        let sweeper = Arc::clone(&inner);
        let sweep = tokio::spawn(async move { sweeper.sweep("startup").await });
        *inner.startup_sweep.lock() = Some(sweep);

        Self { inner }
    }

    /// Creates a cache backed by HTTP and the configured directory.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn from_config(config: &ImageCacheConfig) -> reqwest::Result<Self> {
        let fetcher = HttpImageFetcher::new(
            config.max_concurrent_downloads,
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )?;
        let disk = DiskImageCache::new(
            config.effective_dir(),
            ExpiryPolicy::new(config.ttl()),
            Arc::new(SystemClock),
        );
        Ok(Self::new(disk, Arc::new(fetcher)))
    }

    /// Returns the handle for `url` if it was already hydrated in this
    /// process. Never touches the disk or the network.
    #[must_use]
    pub fn get_cached_image_url(&self, url: &str) -> Option<LocalHandle> {
        self.inner.memory.get(url)
    }

    /// Returns true if `url` was already hydrated in this process.
    #[must_use]
    pub fn is_image_cached(&self, url: &str) -> bool {
        self.inner.memory.contains(url)
    }

    /// Resolves `url` to a local handle.
    ///
    /// # Errors
    /// Returns [`CacheError::FetchFailure`] or
    /// [`CacheError::MaterializationFailure`]; callers fall back to `url`.
    pub async fn preload_image(&self, url: &str) -> CacheResult<LocalHandle> {
        self.load(url).await.map(|loaded| loaded.handle)
    }

    /// Resolves `url` and reports which tier answered.
    ///
    /// # Errors
    /// Returns [`CacheError::FetchFailure`] or
    /// [`CacheError::MaterializationFailure`].
    pub async fn load(&self, url: &str) -> CacheResult<LoadedImage> {
        if let Some(handle) = self.inner.memory.get(url) {
            return Ok(LoadedImage {
                url: url.to_string(),
                handle,
                source: ImageSource::MemoryCache,
            });
        }

        self.join_or_start(url).await
    }

    fn join_or_start(&self, url: &str) -> PendingLoad {
        let mut pending = self.inner.pending.lock();
        if let Some(existing) = pending.get(url) {
            trace!(url = %url, "Joining in-flight load");
            return existing.clone();
        }

        // Spawned so the load finishes even if every waiter goes away.
        let task = tokio::spawn(Arc::clone(&self.inner).resolve(url.to_string()));
        let inner = Arc::clone(&self.inner);
        let owned = url.to_string();
        let load = async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    inner.pending.lock().remove(&owned);
                    Err(CacheError::fetch(owned, format!("Load task failed: {e}")))
                }
            }
        }
        .boxed()
        .shared();

        pending.insert(url.to_string(), load.clone());
        load
    }

    /// Warms the cache for many URLs without waiting. Failures are logged.
    pub fn prefetch_batch<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for url in urls {
            let url = url.into();
            let cache = self.clone();
            tokio::spawn(async move {
                if let Err(e) = cache.preload_image(&url).await {
                    debug!(url = %url, error = %e, "Prefetch failed");
                }
            });
        }
    }

    /// Resolves `url`, then hands out a private handle over the same content.
    ///
    /// The private handle is revoked when the guard is dropped; the shared
    /// handle stays live for other consumers.
    ///
    /// # Errors
    /// Returns the load failure, or [`CacheError::MaterializationFailure`] if
    /// the cache was cleared before the content could be copied.
    pub async fn checkout(&self, url: &str) -> CacheResult<ScopedHandle> {
        let loaded = self.load(url).await?;
        let image = self
            .inner
            .handles
            .resolve(&loaded.handle)
            .ok_or_else(|| CacheError::materialization(url, "handle revoked before checkout"))?;
        Ok(self.inner.handles.scoped(image))
    }

    /// Returns the content behind a live handle.
    #[must_use]
    pub fn resolve_handle(&self, handle: &LocalHandle) -> Option<MaterializedImage> {
        self.inner.handles.resolve(handle)
    }

    /// Counts durable entries and bytes with a full scan.
    pub async fn get_cache_stats(&self) -> StoreStats {
        match self.inner.disk.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "Failed to compute cache stats");
                StoreStats::default()
            }
        }
    }

    /// Runs the TTL sweep now. Returns the number of purged entries.
    pub async fn manual_cleanup(&self) -> usize {
        self.inner.sweep("manual").await
    }

    /// Waits for the sweep started at construction. Returns the number of
    /// purged entries, or 0 if it was already awaited.
    pub async fn wait_for_startup_sweep(&self) -> usize {
        let sweep = self.inner.startup_sweep.lock().take();
        match sweep {
            Some(sweep) => sweep.await.unwrap_or_else(|e| {
                warn!(error = %e, "Startup sweep task failed");
                0
            }),
            None => 0,
        }
    }

    /// Revokes every memory-tier handle and empties both tiers.
    ///
    /// The memory tier is empty when this returns. The durable store is
    /// cleared in the background; await the returned task to observe it.
    pub fn clear_cache(&self) -> JoinHandle<()> {
        let revoked = self
            .inner
            .memory
            .drain()
            .iter()
            .filter(|(_, handle)| self.inner.handles.revoke(handle))
            .count();
        info!(revoked = revoked, "Cleared memory image cache");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.disk.clear().await {
                Ok(()) => info!("Cleared durable image store"),
                Err(e) => warn!(error = %e, "Failed to clear durable image store"),
            }
        })
    }

    /// Returns memory tier statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.inner.memory.stats()
    }

    /// Returns the number of loads currently in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the number of live handles, shared and private.
    #[must_use]
    pub fn live_handle_count(&self) -> usize {
        self.inner.handles.live_count()
    }
}

impl CacheInner {
    async fn resolve(self: Arc<Self>, url: String) -> CacheResult<LoadedImage> {
        let result = self.hydrate(&url).await;
        self.pending.lock().remove(&url);
        result
    }

    async fn hydrate(&self, url: &str) -> CacheResult<LoadedImage> {
        let loaded = |handle: LocalHandle, source: ImageSource| LoadedImage {
            url: url.to_string(),
            handle,
            source,
        };

        // A previous flight may have finished between the caller's check and
        // this task starting.
        if let Some(handle) = self.memory.peek(url) {
            return Ok(loaded(handle, ImageSource::MemoryCache));
        }

        if let Some(entry) = self.disk.get(url).await {
            match materialize(url, entry.content) {
                Ok(image) => {
                    let handle = self.install(url, image);
                    debug!(url = %url, source = "disk", "Image hydrated");
                    return Ok(loaded(handle, ImageSource::DiskCache));
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Discarding unreadable disk cache entry");
                    if let Err(e) = self.disk.delete(url).await {
                        warn!(url = %url, error = %e, "Failed to evict from disk cache");
                    }
                }
            }
        }

        let bytes = self.fetcher.fetch(url).await.inspect_err(|e| {
            warn!(url = %url, error = %e, "Image download failed");
        })?;
        let image = materialize(url, bytes.clone()).inspect_err(|e| {
            warn!(url = %url, error = %e, "Downloaded body is not an image");
        })?;
        let handle = self.install(url, image);

        if let Err(e) = self.disk.put(url, &bytes).await {
            warn!(url = %url, error = %e, "Failed to cache to disk");
        }

        debug!(url = %url, source = "network", "Image hydrated");
        Ok(loaded(handle, ImageSource::Network))
    }

    fn install(&self, url: &str, image: MaterializedImage) -> LocalHandle {
        let handle = self.handles.create(image);
        let installed = self.memory.insert_if_absent(url, handle.clone());
        if installed != handle {
            self.handles.revoke(&handle);
        }
        installed
    }

    async fn sweep(&self, trigger: &'static str) -> usize {
        match sweep_expired(&self.disk).await {
            Ok(purged) => {
                debug!(trigger = trigger, purged = purged, "TTL sweep finished");
                purged
            }
            Err(e) => {
                warn!(trigger = trigger, error = %e, "TTL sweep failed");
                0
            }
        }
    }
}
