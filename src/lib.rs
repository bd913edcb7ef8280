//! Moodfade library crate
//!
//! Re-exports core modules for the service binary and integration tests.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod mood;
pub mod recommendation;
pub mod store;
pub mod streaming;

// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use error::{Error, Result};
pub use models::{Playlist, Track, UserProfile};
pub use mood::{Mode, MoodLabel};
