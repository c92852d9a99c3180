//! Covercache - a two-tier cache for remote cover images.
//!
//! This crate keeps fetched images in a durable on-disk store with a
//! time-to-live, hydrates them into process-local handles on demand, and
//! de-duplicates concurrent loads of the same URL.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the cache's consumers.
pub mod application;
/// Domain layer containing entities, ports, and the expiry policy.
pub mod domain;
/// Infrastructure layer containing adapters for storage, network, and configuration.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "covercache";
