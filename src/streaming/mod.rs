//! Streaming-service collaborators
//!
//! Enrichment (cover art, canonical links, favorite-artist top tracks) and
//! playlist writes go through two traits. Every call carries the user's
//! access token explicitly: a [`StreamingConnector`] turns a token into
//! clients scoped to that one request.

pub mod spotify;
pub mod sync;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::models::Track;

pub use spotify::{SpotifyClient, SpotifyConnector};
pub use sync::{PlaylistSynchronizer, SyncReport};

/// Best search hit for a title/author pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackMatch {
    pub cover_url: Option<String>,
    pub canonical_url: Option<String>,
    pub external_id: Option<String>,
}

/// A playlist on the streaming service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistHandle {
    pub id: String,
    pub url: Option<String>,
}

#[async_trait]
pub trait EnrichmentClient: Send + Sync {
    /// Search `track:{title} artist:{author}`, first hit only
    async fn search_track(&self, title: &str, author: &str) -> Result<Option<TrackMatch>>;

    /// Resolve an artist name to the service's artist id
    async fn search_artist(&self, name: &str) -> Result<Option<String>>;

    /// The artist's top tracks, tagged [`Provenance::FavoriteArtist`](crate::models::Provenance)
    async fn top_tracks(&self, artist_id: &str) -> Result<Vec<Track>>;
}

#[async_trait]
pub trait PlaylistClient: Send + Sync {
    /// Find the user's playlist called `name` (case-insensitive) or create it
    async fn ensure_playlist(&self, name: &str) -> Result<PlaylistHandle>;

    /// Replace the playlist's contents with the given track ids, in order
    async fn replace_tracks(&self, playlist_id: &str, external_ids: &[String]) -> Result<()>;
}

/// Builds token-scoped clients
pub trait StreamingConnector: Send + Sync {
    fn enrichment(&self, access_token: &str) -> Arc<dyn EnrichmentClient>;
    fn playlists(&self, access_token: &str) -> Arc<dyn PlaylistClient>;
}
