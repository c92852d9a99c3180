//! Application layer with the consumers of the image cache.

/// Display components built on the cache.
pub mod services;
/// Use case implementations.
pub mod use_cases;

pub use services::{CoverDisplay, CoverMode, CoverView};
pub use use_cases::{CoverOutcome, CoverReport, FetchCoversUseCase};
