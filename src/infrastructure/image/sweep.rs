//! Time-to-live sweep over the durable store.

use tracing::{debug, info, trace, warn};

use crate::domain::ports::CacheResult;

use super::disk_cache::DiskImageCache;

/// Deletes every durable entry whose age has reached the TTL, along with
/// damaged entries and files orphaned by interrupted writes.
///
/// Each candidate is re-checked at deletion time, so an entry rewritten by a
/// concurrent lookup after the scan saw it survives. Returns the number of
/// purged entries. Individual delete failures are logged and skipped; the
/// sweep keeps going.
///
/// # Errors
/// Returns error if the store cannot be opened or listed.
pub async fn sweep_expired(store: &DiskImageCache) -> CacheResult<usize> {
    let mut scan = store.scan_all().await?;
    let mut purged = 0usize;

    while let Some(record) = scan.next_record().await {
        if record.intact && !store.is_expired(record.stored_at) {
            continue;
        }
        match store.delete_if_stale(&record.url).await {
            Ok(true) => {
                debug!(url = %record.url, stored_at = record.stored_at, "Swept stale entry");
                purged += 1;
            }
            Ok(false) => trace!(url = %record.url, "Entry rewritten since scan, kept"),
            Err(e) => warn!(url = %record.url, error = %e, "Failed to sweep stale entry"),
        }
    }

    match store.remove_orphans().await {
        Ok(0) => {}
        Ok(removed) => info!(removed = removed, "Removed orphaned cache files"),
        Err(e) => warn!(error = %e, "Failed to remove orphaned cache files"),
    }

    if purged > 0 {
        info!(purged = purged, "Cleaned up expired cache entries");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;
    use tempfile::TempDir;

    use crate::domain::entities::ImageId;
    use crate::domain::ports::Clock;
    use crate::domain::ports::mocks::ManualClock;
    use crate::domain::services::ExpiryPolicy;

    type Hook = Box<dyn FnOnce(DateTime<Utc>) + Send>;

    /// Clock that runs a one-shot hook the next time it is read, standing in
    /// for another writer that gets in between two store operations.
    struct InterleavingClock {
        inner: ManualClock,
        on_read: Mutex<Option<Hook>>,
    }

    impl InterleavingClock {
        fn new() -> Self {
            Self {
                inner: ManualClock::default(),
                on_read: Mutex::new(None),
            }
        }

        fn on_next_read(&self, hook: impl FnOnce(DateTime<Utc>) + Send + 'static) {
            *self.on_read.lock() = Some(Box::new(hook));
        }
    }

    impl Clock for InterleavingClock {
        fn now(&self) -> DateTime<Utc> {
            let now = self.inner.now();
            let hook = self.on_read.lock().take();
            if let Some(hook) = hook {
                hook(now);
            }
            now
        }
    }

    fn write_entry(dir: &std::path::Path, url: &str, body: &[u8], stored_at: i64) {
        let id = ImageId::from_url(url);
        let meta = serde_json::json!({ "url": url, "stored_at": stored_at, "size": body.len() });
        std::fs::write(dir.join(format!("{id}.img")), body).unwrap();
        std::fs::write(dir.join(format!("{id}.meta")), meta.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let store = DiskImageCache::new(
            temp_dir.path().to_path_buf(),
            ExpiryPolicy::default(),
            clock.clone(),
        );

        store.put("https://x/old.jpg", b"old").await.unwrap();
        clock.advance(chrono::Duration::hours(12));
        store.put("https://x/new.jpg", b"new").await.unwrap();
        clock.advance(chrono::Duration::hours(12));

        let purged = sweep_expired(&store).await.unwrap();
        assert_eq!(purged, 1);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.count, 1);
        assert!(store.get("https://x/new.jpg").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_keeps_entry_rewritten_after_scan() {
        const URL: &str = "https://x/cover.jpg";
        let temp_dir = TempDir::new().unwrap();
        let dir: PathBuf = temp_dir.path().to_path_buf();
        let clock = Arc::new(InterleavingClock::new());
        let store = DiskImageCache::new(dir.clone(), ExpiryPolicy::default(), clock.clone());

        store.put(URL, b"stale").await.unwrap();
        clock.inner.advance(chrono::Duration::hours(25));

        // The sweep's first clock read is its expiry check on the scanned
        // record; a refetch lands right then.
        let rewrite_dir = dir.clone();
        clock.on_next_read(move |now| {
            write_entry(&rewrite_dir, URL, b"fresh", now.timestamp_millis());
        });

        let purged = sweep_expired(&store).await.unwrap();

        assert_eq!(purged, 0);
        let entry = store.get(URL).await.unwrap();
        assert_eq!(&entry.content[..], b"fresh");
    }

    #[tokio::test]
    async fn test_sweep_removes_damaged_and_orphaned_files() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let clock = Arc::new(ManualClock::default());
        let store = DiskImageCache::new(dir.clone(), ExpiryPolicy::default(), clock.clone());

        store.put("https://x/ok.jpg", b"intact").await.unwrap();
        write_entry(&dir, "https://x/short.jpg", b"full body", clock.now_millis());
        let short = ImageId::from_url("https://x/short.jpg");
        std::fs::write(dir.join(format!("{short}.img")), b"full").unwrap();
        let orphan = ImageId::from_url("https://x/orphan.jpg");
        std::fs::write(dir.join(format!("{orphan}.img")), b"no meta").unwrap();
        std::fs::write(dir.join(format!("{orphan}.img.tmp")), b"partial").unwrap();

        let purged = sweep_expired(&store).await.unwrap();

        assert_eq!(purged, 1);
        assert!(!dir.join(format!("{short}.meta")).exists());
        assert!(!dir.join(format!("{orphan}.img")).exists());
        assert!(!dir.join(format!("{orphan}.img.tmp")).exists());
        assert!(store.get("https://x/ok.jpg").await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_on_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::default());
        let store = DiskImageCache::new(
            temp_dir.path().join("fresh"),
            ExpiryPolicy::default(),
            clock.clone(),
        );

        assert_eq!(sweep_expired(&store).await.unwrap(), 0);
    }
}
