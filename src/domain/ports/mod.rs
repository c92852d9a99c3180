mod clock_port;
mod image_cache_port;

pub use clock_port::Clock;
pub use image_cache_port::{CacheError, CacheResult, ImageFetcher};

#[cfg(test)]
pub use image_cache_port::MockImageFetcher;
