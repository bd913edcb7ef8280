//! In-process store
//!
//! Backs all three storage traits with `RwLock`ed maps. Used by tests and by
//! the service when no `DATABASE_URL` is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CatalogStore, HistoryStore, ProfileStore};
use crate::error::Result;
use crate::models::{NewSession, SessionRecord, Track, UserProfile};
use crate::mood::MoodLabel;

#[derive(Default)]
pub struct MemoryStore {
    tracks: RwLock<Vec<Track>>,
    sessions: RwLock<Vec<SessionRecord>>,
    profiles: RwLock<HashMap<String, UserProfile>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        Self {
            tracks: RwLock::new(tracks),
            ..Self::default()
        }
    }

    pub async fn insert_track(&self, track: Track) {
        self.tracks.write().await.push(track);
    }

    /// Insert a fully formed record, e.g. a backdated one in a test
    pub async fn insert_session(&self, session: SessionRecord) {
        self.sessions.write().await.push(session);
    }

    pub async fn insert_profile(&self, profile: UserProfile) {
        self.profiles
            .write()
            .await
            .insert(profile.user_id.clone(), profile);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn tracks_by_mood(&self, mood: MoodLabel) -> Result<Vec<Track>> {
        Ok(self
            .tracks
            .read()
            .await
            .iter()
            .filter(|t| t.mood_category == Some(mood))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn recent_sessions(
        &self,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<SessionRecord>> {
        let mut sessions: Vec<SessionRecord> = self
            .sessions
            .read()
            .await
            .iter()
            .filter(|s| s.user_id == user_id)
            .filter(|s| since.map_or(true, |since| s.created_at >= since))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn append_session(&self, session: NewSession) -> Result<SessionRecord> {
        let record = session.into_record(Uuid::new_v4().to_string(), Utc::now());
        self.sessions.write().await.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().await.get(user_id).cloned())
    }

    async fn update_target_mood(
        &self,
        user_id: &str,
        mood: Option<MoodLabel>,
    ) -> Result<UserProfile> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                user_id: user_id.to_string(),
                ..UserProfile::default()
            });
        profile.target_mood = mood;
        profile.target_mood_changed_at = Some(Utc::now());
        Ok(profile.clone())
    }

    async fn update_favorite_artists(
        &self,
        user_id: &str,
        artists: Vec<String>,
    ) -> Result<UserProfile> {
        let mut profiles = self.profiles.write().await;
        let profile = profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile {
                user_id: user_id.to_string(),
                ..UserProfile::default()
            });
        profile.favorite_artists = artists;
        Ok(profile.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_session(user: &str) -> NewSession {
        NewSession {
            user_id: user.to_string(),
            mood: Some(MoodLabel::CalmReflective),
            mode: None,
            target_mood_snapshot: None,
            feedback: None,
            liked_track_keys: vec![],
            disliked_track_keys: vec![],
        }
    }

    #[tokio::test]
    async fn test_tracks_by_mood_filters_catalog() {
        let store = MemoryStore::with_tracks(vec![
            Track::catalog("1", "A", "X", Some(MoodLabel::CalmReflective)),
            Track::catalog("2", "B", "Y", Some(MoodLabel::MelancholicDark)),
            Track::catalog("3", "C", "Z", None),
        ]);
        let calm = store.tracks_by_mood(MoodLabel::CalmReflective).await.unwrap();
        assert_eq!(calm.len(), 1);
        assert_eq!(calm[0].id, "1");
    }

    #[tokio::test]
    async fn test_recent_sessions_window_and_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (i, days) in [40i64, 1, 10].iter().enumerate() {
            store
                .insert_session(
                    new_session("u1").into_record(format!("s{}", i), now - Duration::days(*days)),
                )
                .await;
        }
        store.append_session(new_session("u2")).await.unwrap();

        let recent = store
            .recent_sessions("u1", Some(now - Duration::days(30)))
            .await
            .unwrap();
        let ids: Vec<_> = recent.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);

        let all = store.recent_sessions("u1", None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_target_mood_change_stamps_fence() {
        let store = MemoryStore::new();
        let first = store
            .update_target_mood("u1", Some(MoodLabel::RomanticSensual))
            .await
            .unwrap();
        let stamped = first.target_mood_changed_at.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        // re-selecting the same target moves the fence forward
        let same = store
            .update_target_mood("u1", Some(MoodLabel::RomanticSensual))
            .await
            .unwrap();
        let restamped = same.target_mood_changed_at.unwrap();
        assert!(restamped > stamped);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let cleared = store.update_target_mood("u1", None).await.unwrap();
        assert_eq!(cleared.target_mood, None);
        assert!(cleared.target_mood_changed_at.unwrap() > restamped);
    }
}
