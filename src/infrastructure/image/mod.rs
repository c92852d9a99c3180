//! Image handling infrastructure.
//!
//! This module provides:
//! - An in-memory index of hydrated handles
//! - A disk-backed durable store with TTL expiry
//! - Handle lifecycle (materialize, create, revoke)
//! - The async tiered loading pipeline

pub mod disk_cache;
pub mod handles;
pub mod http_fetcher;
pub mod loader;
pub mod memory_cache;
pub mod sweep;

pub use disk_cache::{DiskImageCache, ScanRecord, StoreScan};
pub use handles::{HandleRegistry, ScopedHandle, materialize};
pub use http_fetcher::HttpImageFetcher;
pub use loader::{ImageCache, ImageCacheConfig};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use sweep::sweep_expired;
