//! Domain entity definitions.

mod handle;
mod image;

pub use handle::{HANDLE_SCHEME, LocalHandle, MaterializedImage};
pub use image::{CacheEntry, ImageId, ImageSource, LoadedImage, StoreStats};
