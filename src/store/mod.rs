//! Storage collaborators
//!
//! The recommendation pipeline reads a mood-tagged catalog and a user's
//! session history, and reads/writes a small mutable profile. Each concern is
//! an async trait so the pipeline can run against Postgres in the service and
//! against [`memory::MemoryStore`] in tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{NewSession, SessionRecord, Track, UserProfile};
use crate::mood::MoodLabel;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Read-only, mood-tagged track catalog
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Every catalog track tagged with `mood`, in no particular order
    async fn tracks_by_mood(&self, mood: MoodLabel) -> Result<Vec<Track>>;
}

/// Append-only session history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Sessions for `user_id` created at or after `since` (all when `None`),
    /// newest first.
    async fn recent_sessions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SessionRecord>>;

    /// Append a finished session; the store assigns id and timestamp.
    async fn append_session(&self, session: NewSession) -> Result<SessionRecord>;
}

/// Mutable per-user profile
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>>;

    /// Set or clear the target mood. Every call stamps `target_mood_changed_at`
    /// with the store's clock, even when the mood is unchanged.
    async fn update_target_mood(
        &self,
        user_id: &str,
        mood: Option<MoodLabel>,
    ) -> Result<UserProfile>;

    async fn update_favorite_artists(
        &self,
        user_id: &str,
        artists: Vec<String>,
    ) -> Result<UserProfile>;
}
