//! Recommendation service
//!
//! Wires the stores, the streaming connector and the pure pipeline pieces
//! together. Every call names its user, and the streaming access token is an
//! argument, never ambient state.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::engine::{BuildRequest, PlaylistBuilder};
use super::feedback::{aggregate, FeedbackTally, MoodAttribution};
use super::trend::{self, TrendReport};
use crate::database::with_retry;
use crate::error::{Error, Result};
use crate::models::{parse_favorite_artists, NewSession, Playlist, SessionRecord, UserProfile};
use crate::mood::{Mode, MoodLabel};
use crate::store::{HistoryStore, ProfileStore};
use crate::streaming::{PlaylistSynchronizer, StreamingConnector, SyncReport};

const READ_RETRIES: u32 = 3;
const READ_RETRY_DELAY: Duration = Duration::from_millis(100);

/// A user's (mood, mode) choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub mood: MoodLabel,
    pub mode: Mode,
}

#[derive(Clone)]
pub struct RecommendationService {
    builder: PlaylistBuilder,
    history: Arc<dyn HistoryStore>,
    profiles: Arc<dyn ProfileStore>,
    streaming: Option<Arc<dyn StreamingConnector>>,
    synchronizer: PlaylistSynchronizer,
    feedback_window: Option<chrono::Duration>,
}

impl RecommendationService {
    pub fn new(
        builder: PlaylistBuilder,
        history: Arc<dyn HistoryStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            builder,
            history,
            profiles,
            streaming: None,
            synchronizer: PlaylistSynchronizer::default(),
            feedback_window: Some(chrono::Duration::days(30)),
        }
    }

    pub fn with_streaming(
        mut self,
        connector: Arc<dyn StreamingConnector>,
        synchronizer: PlaylistSynchronizer,
    ) -> Self {
        self.streaming = Some(connector);
        self.synchronizer = synchronizer;
        self
    }

    /// History window for the aggregator; `None` reads everything
    pub fn with_feedback_window(mut self, window: Option<chrono::Duration>) -> Self {
        self.feedback_window = window;
        self
    }

    pub fn has_streaming(&self) -> bool {
        self.streaming.is_some()
    }

    /// Profile for `user_id`, or a blank one when the user has none yet
    pub async fn profile_or_default(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self
            .profiles
            .get_profile(user_id)
            .await?
            .unwrap_or_else(|| UserProfile {
                user_id: user_id.to_string(),
                ..UserProfile::default()
            }))
    }

    pub async fn get_profile(&self, user_id: &str) -> Result<UserProfile> {
        self.profiles
            .get_profile(user_id)
            .await?
            .ok_or_else(|| Error::not_found("profile", user_id))
    }

    /// Tally over the configured window. Read failures degrade to an empty
    /// tally.
    pub async fn feedback_tally(&self, user_id: &str) -> FeedbackTally {
        let since = self.feedback_window.map(|w| Utc::now() - w);
        match with_retry(
            "feedback history read",
            || self.history.recent_sessions(user_id, since),
            READ_RETRIES,
            READ_RETRY_DELAY,
        )
        .await
        {
            Ok(sessions) => aggregate(&sessions, MoodAttribution::SplitRegulation),
            Err(e) => {
                warn!("History read failed for {}: {}; building without feedback", user_id, e);
                FeedbackTally::default()
            }
        }
    }

    /// Build a playlist for the user's current profile
    #[instrument(skip(self, access_token, cancel))]
    pub async fn build_playlist(
        &self,
        user_id: &str,
        selection: Selection,
        access_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Playlist> {
        let profile = match self.profile_or_default(user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Profile read failed for {}: {}; using defaults", user_id, e);
                UserProfile {
                    user_id: user_id.to_string(),
                    ..UserProfile::default()
                }
            }
        };
        self.build_for_profile(&profile, selection, access_token, cancel)
            .await
    }

    /// Build with an explicitly supplied profile
    pub async fn build_for_profile(
        &self,
        profile: &UserProfile,
        selection: Selection,
        access_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Playlist> {
        let tally = self.feedback_tally(&profile.user_id).await;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let request = BuildRequest {
            current_mood: selection.mood,
            target_mood: profile.target_mood,
            mode: selection.mode,
            favorite_artists: profile.favorite_artists.clone(),
        };
        let enrichment = match (&self.streaming, access_token) {
            (Some(connector), Some(token)) => Some(connector.enrichment(token)),
            _ => None,
        };

        self.builder.build(&request, &tally, enrichment, cancel).await
    }

    /// Progress toward the user's current target mood
    #[instrument(skip(self))]
    pub async fn trend(&self, user_id: &str) -> Result<Option<TrendReport>> {
        let profile = self.profile_or_default(user_id).await?;
        if profile.target_mood.is_none() {
            return Ok(None);
        }
        let sessions = with_retry(
            "trend history read",
            || self.history.recent_sessions(user_id, profile.target_mood_changed_at),
            READ_RETRIES,
            READ_RETRY_DELAY,
        )
        .await?;
        Ok(trend::evaluate(
            &sessions,
            profile.target_mood,
            profile.target_mood_changed_at,
        ))
    }

    /// Append a finished session. Failures are user-facing.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn save_session(&self, session: NewSession) -> Result<SessionRecord> {
        if session.user_id.trim().is_empty() {
            return Err(Error::bad_request("Session has no user"));
        }
        let record = self
            .history
            .append_session(session)
            .await
            .map_err(|e| Error::save_failed("session", &e))?;
        info!(
            "Saved session {} ({} liked, {} disliked)",
            record.id,
            record.liked_track_keys.len(),
            record.disliked_track_keys.len()
        );
        Ok(record)
    }

    /// Set or clear the target mood; stamps the change time
    pub async fn update_target_mood(
        &self,
        user_id: &str,
        mood: Option<MoodLabel>,
    ) -> Result<UserProfile> {
        self.profiles
            .update_target_mood(user_id, mood)
            .await
            .map_err(|e| Error::save_failed("profile", &e))
    }

    /// Store favorite artists from a comma-separated list
    pub async fn update_favorite_artists(&self, user_id: &str, raw: &str) -> Result<UserProfile> {
        let artists = parse_favorite_artists(raw);
        self.profiles
            .update_favorite_artists(user_id, artists)
            .await
            .map_err(|e| Error::save_failed("profile", &e))
    }

    /// Push a playlist to the user's streaming account
    pub async fn sync_playlist(
        &self,
        playlist: &Playlist,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let connector = self
            .streaming
            .as_ref()
            .ok_or_else(|| Error::streaming("No streaming service configured"))?;
        let playlists = connector.playlists(access_token);
        let enrichment = connector.enrichment(access_token);
        self.synchronizer
            .sync(playlist, playlists.as_ref(), enrichment.as_ref(), cancel)
            .await
    }
}
