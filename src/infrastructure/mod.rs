//! Infrastructure layer with adapters for the clock, configuration, and
//! the image cache tiers.

/// System clock adapter.
pub mod clock;
/// Application configuration.
pub mod config;
/// Image caching (memory tier, durable store, handles, network).
pub mod image;

pub use clock::SystemClock;
pub use config::{AppConfig, CliArgs, Command, ConfigError, LogLevel, StorageManager};
pub use image::{
    CacheStats, DiskImageCache, HandleRegistry, HttpImageFetcher, ImageCache, ImageCacheConfig,
    MemoryImageCache, ScopedHandle, sweep_expired,
};
