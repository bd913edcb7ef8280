//! Feedback Aggregation
//!
//! Turns a window of session records into the tally used to bias playlist
//! ranking: like/dislike counts per composite track key, and a normalized
//! sentiment per mood. Recomputed from raw history on every build; nothing
//! here is persisted.

use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::keys::TrackKey;
use crate::models::SessionRecord;
use crate::mood::{Mode, MoodLabel};

/// Share of a regulation session's sentiment credited to its starting mood
pub const REGULATION_SOURCE_SHARE: f64 = 0.4;
/// Share of a regulation session's sentiment credited to its target mood
pub const REGULATION_TARGET_SHARE: f64 = 0.6;

/// How a session's rating is credited to moods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoodAttribution {
    /// Entire weight to the session's own mood
    Whole,
    /// Regulation sessions split 40/60 between own mood and target snapshot.
    /// This is the variant used for recommendation scoring.
    #[default]
    SplitRegulation,
}

/// Like/dislike counts for one composite key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrackStats {
    pub likes: u32,
    pub dislikes: u32,
}

/// Aggregated feedback for one user
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedbackTally {
    tracks: HashMap<TrackKey, TrackStats>,
    /// Normalized to `[-1, 1]`
    mood_sentiment: HashMap<MoodLabel, f64>,
}

impl FeedbackTally {
    /// Counts for a key; zero when the key was never rated
    pub fn stats(&self, key: &TrackKey) -> TrackStats {
        self.tracks.get(key).copied().unwrap_or_default()
    }

    /// Normalized sentiment for a mood; zero when the mood is absent or unknown
    pub fn sentiment(&self, mood: Option<MoodLabel>) -> f64 {
        mood.and_then(|m| self.mood_sentiment.get(&m).copied())
            .unwrap_or(0.0)
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn mood_sentiments(&self) -> &HashMap<MoodLabel, f64> {
        &self.mood_sentiment
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty() && self.mood_sentiment.is_empty()
    }
}

/// Aggregate the supplied sessions. Windowing is the caller's job.
pub fn aggregate(sessions: &[SessionRecord], attribution: MoodAttribution) -> FeedbackTally {
    let mut tracks: HashMap<TrackKey, TrackStats> = HashMap::new();
    let mut raw: HashMap<MoodLabel, f64> = HashMap::new();

    for session in sessions {
        // A key listed as both liked and disliked counts toward both
        for key in &session.liked_track_keys {
            tracks.entry(TrackKey::from_stored(key)).or_default().likes += 1;
        }
        for key in &session.disliked_track_keys {
            tracks.entry(TrackKey::from_stored(key)).or_default().dislikes += 1;
        }

        let (Some(mood), Some(feedback)) = (session.mood, session.feedback) else {
            if session.feedback.is_some() {
                debug!("Session {} has feedback but no mood; skipping sentiment", session.id);
            }
            continue;
        };

        let base = feedback.aggregator_weight();
        if base == 0.0 {
            continue;
        }

        match (attribution, session.mode, session.target_mood_snapshot) {
            (MoodAttribution::SplitRegulation, Some(Mode::Regulation), Some(target)) => {
                *raw.entry(mood).or_insert(0.0) += base * REGULATION_SOURCE_SHARE;
                *raw.entry(target).or_insert(0.0) += base * REGULATION_TARGET_SHARE;
            }
            _ => {
                *raw.entry(mood).or_insert(0.0) += base;
            }
        }
    }

    let mood_sentiment = normalize(raw);

    debug!(
        "Aggregated {} sessions: {} rated tracks, mood sentiment {:?}",
        sessions.len(),
        tracks.len(),
        mood_sentiment
    );

    FeedbackTally {
        tracks,
        mood_sentiment,
    }
}

/// Divide by the largest magnitude so values land in `[-1, 1]`
fn normalize(raw: HashMap<MoodLabel, f64>) -> HashMap<MoodLabel, f64> {
    let max_abs = raw.values().fold(0.0f64, |m, v| m.max(v.abs()));
    let divisor = if max_abs == 0.0 { 1.0 } else { max_abs };
    raw.into_iter().map(|(mood, v)| (mood, v / divisor)).collect()
}
