//! Postgres-backed store
//!
//! Mood, mode and feedback columns are plain text; unknown values read back
//! as `None` (logged) instead of failing the whole query.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{CatalogStore, HistoryStore, ProfileStore};
use crate::error::Result;
use crate::models::{NewSession, SessionRecord, Track, UserProfile};
use crate::mood::{FeedbackLabel, Mode, MoodLabel};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update a catalog track
    pub async fn upsert_track(&self, track: &Track) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tracks (id, title, author, mood_category, cover_url, canonical_url, external_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                title = EXCLUDED.title,
                author = EXCLUDED.author,
                mood_category = EXCLUDED.mood_category,
                cover_url = EXCLUDED.cover_url,
                canonical_url = EXCLUDED.canonical_url,
                external_id = EXCLUDED.external_id
            "#,
        )
        .bind(&track.id)
        .bind(&track.title)
        .bind(&track.author)
        .bind(track.mood_category.map(|m| m.as_str()))
        .bind(&track.cover_url)
        .bind(&track.canonical_url)
        .bind(&track.external_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TrackRow {
    id: String,
    title: String,
    author: String,
    mood_category: Option<String>,
    cover_url: Option<String>,
    canonical_url: Option<String>,
    external_id: Option<String>,
}

impl From<TrackRow> for Track {
    fn from(row: TrackRow) -> Self {
        let mood = MoodLabel::parse_lenient(row.mood_category.as_deref());
        let mut track = Track::catalog(row.id, row.title, row.author, mood);
        track.cover_url = row.cover_url;
        track.canonical_url = row.canonical_url;
        track.external_id = row.external_id;
        track
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    user_id: String,
    mood: Option<String>,
    mode: Option<String>,
    target_mood_snapshot: Option<String>,
    feedback: Option<String>,
    liked_track_keys: Vec<String>,
    disliked_track_keys: Vec<String>,
    created_at: DateTime<Utc>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        let mode = row.mode.as_deref().and_then(|m| match m.parse::<Mode>() {
            Ok(mode) => Some(mode),
            Err(e) => {
                warn!("Session {}: {}", row.id, e);
                None
            }
        });
        SessionRecord {
            id: row.id.to_string(),
            user_id: row.user_id,
            mood: MoodLabel::parse_lenient(row.mood.as_deref()),
            mode,
            target_mood_snapshot: MoodLabel::parse_lenient(row.target_mood_snapshot.as_deref()),
            feedback: FeedbackLabel::parse_lenient(row.feedback.as_deref()),
            liked_track_keys: row.liked_track_keys,
            disliked_track_keys: row.disliked_track_keys,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    user_id: String,
    name: String,
    favorite_artists: Vec<String>,
    target_mood: Option<String>,
    target_mood_changed_at: Option<DateTime<Utc>>,
}

impl From<ProfileRow> for UserProfile {
    fn from(row: ProfileRow) -> Self {
        UserProfile {
            user_id: row.user_id,
            name: row.name,
            favorite_artists: row.favorite_artists,
            target_mood: MoodLabel::parse_lenient(row.target_mood.as_deref()),
            target_mood_changed_at: row.target_mood_changed_at,
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, mood, mode, target_mood_snapshot, feedback, \
     liked_track_keys, disliked_track_keys, created_at";

const PROFILE_COLUMNS: &str =
    "user_id, name, favorite_artists, target_mood, target_mood_changed_at";

#[async_trait]
impl CatalogStore for PgStore {
    #[instrument(skip(self))]
    async fn tracks_by_mood(&self, mood: MoodLabel) -> Result<Vec<Track>> {
        let rows = sqlx::query_as::<_, TrackRow>(
            r#"
            SELECT id, title, author, mood_category, cover_url, canonical_url, external_id
            FROM tracks
            WHERE mood_category = $1
            "#,
        )
        .bind(mood.as_str())
        .fetch_all(&self.pool)
        .await?;

        debug!("Catalog returned {} tracks for {}", rows.len(), mood);
        Ok(rows.into_iter().map(Track::from).collect())
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    #[instrument(skip(self))]
    async fn recent_sessions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SessionRecord>> {
        let sql = format!(
            "SELECT {} FROM sessions \
             WHERE user_id = $1 AND ($2::timestamptz IS NULL OR created_at >= $2) \
             ORDER BY created_at DESC",
            SESSION_COLUMNS
        );
        let rows = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(user_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn append_session(&self, session: NewSession) -> Result<SessionRecord> {
        let sql = format!(
            "INSERT INTO sessions \
             (user_id, mood, mode, target_mood_snapshot, feedback, liked_track_keys, disliked_track_keys) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {}",
            SESSION_COLUMNS
        );
        let row = sqlx::query_as::<_, SessionRow>(&sql)
            .bind(&session.user_id)
            .bind(session.mood.map(|m| m.as_str()))
            .bind(session.mode.map(|m| m.as_str()))
            .bind(session.target_mood_snapshot.map(|m| m.as_str()))
            .bind(session.feedback.map(|f| f.as_str()))
            .bind(&session.liked_track_keys)
            .bind(&session.disliked_track_keys)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let sql = format!("SELECT {} FROM user_profiles WHERE user_id = $1", PROFILE_COLUMNS);
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UserProfile::from))
    }

    #[instrument(skip(self))]
    async fn update_target_mood(
        &self,
        user_id: &str,
        mood: Option<MoodLabel>,
    ) -> Result<UserProfile> {
        let sql = format!(
            r#"
            INSERT INTO user_profiles (user_id, target_mood, target_mood_changed_at)
            VALUES ($1, $2::text, NOW())
            ON CONFLICT (user_id) DO UPDATE SET
                target_mood = EXCLUDED.target_mood,
                target_mood_changed_at = NOW(),
                updated_at = NOW()
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .bind(mood.map(|m| m.as_str()))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn update_favorite_artists(
        &self,
        user_id: &str,
        artists: Vec<String>,
    ) -> Result<UserProfile> {
        let sql = format!(
            r#"
            INSERT INTO user_profiles (user_id, favorite_artists)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                favorite_artists = EXCLUDED.favorite_artists,
                updated_at = NOW()
            RETURNING {}
            "#,
            PROFILE_COLUMNS
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(user_id)
            .bind(&artists)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }
}
