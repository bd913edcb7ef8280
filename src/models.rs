//! Core data model: tracks, session records and user profiles

use crate::mood::{FeedbackLabel, Mode, MoodLabel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which pool a playlist track was drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    CurrentPool,
    BridgePool,
    TargetPool,
    FavoriteArtist,
}

impl Provenance {
    /// One-letter tag used in build logs
    pub fn tag(&self) -> &'static str {
        match self {
            Provenance::CurrentPool => "[C]",
            Provenance::BridgePool => "[B]",
            Provenance::TargetPool => "[T]",
            Provenance::FavoriteArtist => "[F]",
        }
    }
}

/// A catalog or streaming-service track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog-unique identifier (streaming id for favorite-artist tracks)
    pub id: String,
    pub title: String,
    pub author: String,
    pub mood_category: Option<MoodLabel>,
    pub cover_url: Option<String>,
    pub canonical_url: Option<String>,
    /// Streaming-service track id, used for playlist sync
    pub external_id: Option<String>,
    pub provenance: Provenance,
    pub provenance_mood: Option<MoodLabel>,
    /// Transient, computed per request
    #[serde(default)]
    pub score: f64,
}

impl Track {
    /// A bare catalog track, before pool tagging and enrichment
    pub fn catalog(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        mood: Option<MoodLabel>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            mood_category: mood,
            cover_url: None,
            canonical_url: None,
            external_id: None,
            provenance: Provenance::CurrentPool,
            provenance_mood: mood,
            score: 0.0,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance, mood: Option<MoodLabel>) -> Self {
        self.provenance = provenance;
        self.provenance_mood = mood;
        self
    }

    /// Compact one-line form for logs
    pub fn describe(&self) -> String {
        match self.provenance_mood {
            Some(mood) => format!(
                "{} {} - {} ({}) [score={:.2}]",
                self.provenance.tag(),
                self.title,
                self.author,
                mood,
                self.score
            ),
            None => format!(
                "{} {} - {} [score={:.2}]",
                self.provenance.tag(),
                self.title,
                self.author,
                self.score
            ),
        }
    }
}

/// An immutable, stored listening session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub user_id: String,
    pub mood: Option<MoodLabel>,
    pub mode: Option<Mode>,
    pub target_mood_snapshot: Option<MoodLabel>,
    pub feedback: Option<FeedbackLabel>,
    #[serde(default)]
    pub liked_track_keys: Vec<String>,
    #[serde(default)]
    pub disliked_track_keys: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A session about to be appended to the history store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub user_id: String,
    pub mood: Option<MoodLabel>,
    pub mode: Option<Mode>,
    pub target_mood_snapshot: Option<MoodLabel>,
    pub feedback: Option<FeedbackLabel>,
    #[serde(default)]
    pub liked_track_keys: Vec<String>,
    #[serde(default)]
    pub disliked_track_keys: Vec<String>,
}

impl NewSession {
    /// Stamp the record; `created_at` is assigned by the store
    pub fn into_record(self, id: String, created_at: DateTime<Utc>) -> SessionRecord {
        SessionRecord {
            id,
            user_id: self.user_id,
            mood: self.mood,
            mode: self.mode,
            target_mood_snapshot: self.target_mood_snapshot,
            feedback: self.feedback,
            liked_track_keys: self.liked_track_keys,
            disliked_track_keys: self.disliked_track_keys,
            created_at,
        }
    }
}

/// Mutable per-user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub favorite_artists: Vec<String>,
    pub target_mood: Option<MoodLabel>,
    /// Sessions before this instant do not count toward the current target
    pub target_mood_changed_at: Option<DateTime<Utc>>,
}

/// Split a comma-separated artist list, trimming and dropping empties
pub fn parse_favorite_artists(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// Final output of a playlist build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub tracks: Vec<Track>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
