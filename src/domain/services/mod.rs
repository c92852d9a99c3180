//! Pure domain services.

mod expiry_policy;

pub use expiry_policy::{DEFAULT_TTL, ExpiryPolicy};
