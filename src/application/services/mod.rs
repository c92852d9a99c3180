pub mod cover_view;

pub use cover_view::{CoverDisplay, CoverMode, CoverView};
