//! Mediacache - media resource cache engine for chat clients.
//!
//! This crate renders avatars, thumbnails and previews off the UI thread,
//! keeps them in a cost-bounded cache and persists named thumbnail files.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing the filesystem adapter and media engine.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "mediacache";
