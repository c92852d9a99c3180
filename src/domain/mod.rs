//! Domain layer with core cache entities, policies and port definitions.

/// Entity definitions.
pub mod entities;
/// Port definitions.
pub mod ports;
/// Pure domain services.
pub mod services;

pub use entities::{CacheEntry, ImageId, ImageSource, LoadedImage, LocalHandle, StoreStats};
pub use ports::{CacheError, CacheResult, Clock, ImageFetcher};
pub use services::{DEFAULT_TTL, ExpiryPolicy};
