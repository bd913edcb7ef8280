//! End-of-session draft
//!
//! After listening, the first few playlist tracks are offered for review,
//! all pre-marked as liked. Each toggle moves a track between liked and
//! disliked; an unmarked track becomes liked. Finishing the draft yields the
//! record that is appended to the history store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::keys::TrackKey;
use crate::error::{Error, Result};
use crate::models::{NewSession, Playlist, Track};
use crate::mood::{FeedbackLabel, Mode, MoodLabel};

/// Tracks offered for review, all liked by default
pub const REVIEWED_TRACKS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackMark {
    Liked,
    Disliked,
}

#[derive(Debug, Clone)]
pub struct SessionDraft {
    user_id: String,
    mood: MoodLabel,
    mode: Mode,
    target_mood_snapshot: Option<MoodLabel>,
    reviewed: Vec<TrackKey>,
    marks: HashMap<TrackKey, TrackMark>,
}

impl SessionDraft {
    /// Start a draft for a finished playlist. `target_mood` is the profile's
    /// target at the time of listening.
    pub fn new(
        user_id: impl Into<String>,
        mood: MoodLabel,
        mode: Mode,
        target_mood: Option<MoodLabel>,
        playlist: &Playlist,
    ) -> Self {
        let mut reviewed = Vec::with_capacity(REVIEWED_TRACKS);
        for key in playlist.tracks.iter().map(TrackKey::for_track) {
            if reviewed.len() == REVIEWED_TRACKS {
                break;
            }
            if !reviewed.contains(&key) {
                reviewed.push(key);
            }
        }
        let marks = reviewed
            .iter()
            .map(|k| (k.clone(), TrackMark::Liked))
            .collect();

        Self {
            user_id: user_id.into(),
            mood,
            mode,
            target_mood_snapshot: target_mood,
            reviewed,
            marks,
        }
    }

    /// Keys offered for review, in playlist order
    pub fn reviewed(&self) -> &[TrackKey] {
        &self.reviewed
    }

    pub fn mark(&self, key: &TrackKey) -> Option<TrackMark> {
        self.marks.get(key).copied()
    }

    /// Flip a reviewed track: liked -> disliked -> liked, unmarked -> liked
    pub fn toggle(&mut self, key: &TrackKey) -> Result<TrackMark> {
        if !self.reviewed.contains(key) {
            return Err(Error::bad_request(format!("Track '{}' is not under review", key)));
        }
        let next = match self.marks.get(key) {
            Some(TrackMark::Liked) => TrackMark::Disliked,
            Some(TrackMark::Disliked) | None => TrackMark::Liked,
        };
        self.marks.insert(key.clone(), next);
        Ok(next)
    }

    pub fn toggle_track(&mut self, track: &Track) -> Result<TrackMark> {
        self.toggle(&TrackKey::for_track(track))
    }

    /// Drop any mark from a reviewed track
    pub fn clear(&mut self, key: &TrackKey) {
        self.marks.remove(key);
    }

    fn keys_with(&self, mark: TrackMark) -> Vec<String> {
        self.reviewed
            .iter()
            .filter(|k| self.marks.get(*k) == Some(&mark))
            .map(|k| k.as_str().to_string())
            .collect()
    }

    pub fn finish(self, feedback: Option<FeedbackLabel>) -> NewSession {
        let liked_track_keys = self.keys_with(TrackMark::Liked);
        let disliked_track_keys = self.keys_with(TrackMark::Disliked);
        NewSession {
            user_id: self.user_id,
            mood: Some(self.mood),
            mode: Some(self.mode),
            target_mood_snapshot: self.target_mood_snapshot,
            feedback,
            liked_track_keys,
            disliked_track_keys,
        }
    }
}
