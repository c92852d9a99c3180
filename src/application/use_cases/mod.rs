//! Use case implementations.

mod fetch_covers_use_case;

pub use fetch_covers_use_case::{CoverOutcome, CoverReport, FetchCoversUseCase};
