//! Spotify Web API client
//!
//! Thin reqwest wrapper over the handful of endpoints the engine needs:
//! track and artist search, artist top tracks, the current user's playlists,
//! playlist creation and track replacement.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{EnrichmentClient, PlaylistClient, PlaylistHandle, StreamingConnector, TrackMatch};
use crate::config::StreamingConfig;
use crate::error::{Error, Result};
use crate::models::{Provenance, Track};

const PLAYLIST_PAGE_SIZE: u32 = 50;
/// Upper bound on followed `next` links
const MAX_PLAYLIST_PAGES: usize = 40;
const PLAYLIST_DESCRIPTION: &str = "Your Moodfade playlist";

/// Makes token-scoped [`SpotifyClient`]s that share one connection pool
#[derive(Clone)]
pub struct SpotifyConnector {
    http: Client,
    base_url: String,
    market: String,
}

impl SpotifyConnector {
    pub fn new(config: &StreamingConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("moodfade-engine/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            market: config.market.clone(),
        })
    }

    pub fn client(&self, access_token: &str) -> SpotifyClient {
        SpotifyClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            market: self.market.clone(),
            token: access_token.to_string(),
        }
    }
}

impl StreamingConnector for SpotifyConnector {
    fn enrichment(&self, access_token: &str) -> Arc<dyn EnrichmentClient> {
        Arc::new(self.client(access_token))
    }

    fn playlists(&self, access_token: &str) -> Arc<dyn PlaylistClient> {
        Arc::new(self.client(access_token))
    }
}

/// Client bound to one user's access token
#[derive(Clone)]
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    market: String,
    token: String,
}

// ---- Wire types (only the fields we read) ----

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct ArtistRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: Option<String>,
    name: String,
    #[serde(default)]
    artists: Vec<ArtistRef>,
    album: Option<Album>,
    external_urls: Option<ExternalUrls>,
}

impl ApiTrack {
    fn cover_url(&self) -> Option<String> {
        self.album
            .as_ref()
            .and_then(|a| a.images.first())
            .map(|i| i.url.clone())
    }

    fn canonical_url(&self) -> Option<String> {
        self.external_urls.as_ref().and_then(|u| u.spotify.clone())
    }
}

#[derive(Debug, Deserialize)]
struct Paging<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackSearch {
    tracks: Option<Paging<ApiTrack>>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ArtistSearch {
    artists: Option<Paging<ApiArtist>>,
}

#[derive(Debug, Deserialize)]
struct TopTracks {
    #[serde(default)]
    tracks: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct Me {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiPlaylist {
    id: Option<String>,
    name: Option<String>,
    external_urls: Option<ExternalUrls>,
}

impl SpotifyClient {
    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
    }

    /// Send and decode, mapping 401 to `Unauthorized` and any other
    /// non-success status to a `Streaming` error.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = check_status(request.send().await?).await?;
        Ok(response.json::<T>().await?)
    }

    async fn current_user_id(&self) -> Result<String> {
        let me: Me = self.send_json(self.get("/v1/me")).await?;
        Ok(me.id)
    }

    /// All of the current user's playlists, following `next` links
    async fn list_playlists(&self) -> Result<Vec<ApiPlaylist>> {
        let mut playlists = Vec::new();
        let mut page: Paging<ApiPlaylist> = self
            .send_json(
                self.get("/v1/me/playlists")
                    .query(&[("limit", PLAYLIST_PAGE_SIZE)]),
            )
            .await?;

        for _ in 0..MAX_PLAYLIST_PAGES {
            playlists.append(&mut page.items);
            let Some(next) = page.next.take() else {
                return Ok(playlists);
            };
            page = self
                .send_json(self.http.get(next).bearer_auth(&self.token))
                .await?;
        }

        warn!(
            "Stopped listing playlists after {} pages ({} playlists)",
            MAX_PLAYLIST_PAGES,
            playlists.len()
        );
        Ok(playlists)
    }

    async fn create_playlist(&self, user_id: &str, name: &str) -> Result<PlaylistHandle> {
        let request = self
            .http
            .post(format!("{}/v1/users/{}/playlists", self.base_url, user_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({
                "name": name,
                "description": PLAYLIST_DESCRIPTION,
                "public": false,
            }));
        let created: ApiPlaylist = self.send_json(request).await?;
        let id = created
            .id
            .ok_or_else(|| Error::streaming("Created playlist has no id"))?;
        Ok(PlaylistHandle {
            id,
            url: created.external_urls.and_then(|u| u.spotify),
        })
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::Unauthorized {
            message: body.into(),
        });
    }
    Err(Error::streaming_status(status.as_u16(), body))
}

#[async_trait]
impl EnrichmentClient for SpotifyClient {
    #[instrument(skip(self))]
    async fn search_track(&self, title: &str, author: &str) -> Result<Option<TrackMatch>> {
        let query = format!("track:{} artist:{}", title, author);
        let search: TrackSearch = self
            .send_json(
                self.get("/v1/search")
                    .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")]),
            )
            .await?;

        Ok(search
            .tracks
            .and_then(|p| p.items.into_iter().next())
            .map(|t| TrackMatch {
                cover_url: t.cover_url(),
                canonical_url: t.canonical_url(),
                external_id: t.id,
            }))
    }

    #[instrument(skip(self))]
    async fn search_artist(&self, name: &str) -> Result<Option<String>> {
        let search: ArtistSearch = self
            .send_json(
                self.get("/v1/search")
                    .query(&[("q", name), ("type", "artist"), ("limit", "1")]),
            )
            .await?;
        Ok(search
            .artists
            .and_then(|p| p.items.into_iter().next())
            .map(|a| a.id))
    }

    #[instrument(skip(self))]
    async fn top_tracks(&self, artist_id: &str) -> Result<Vec<Track>> {
        let top: TopTracks = self
            .send_json(
                self.get(&format!("/v1/artists/{}/top-tracks", artist_id))
                    .query(&[("market", self.market.as_str())]),
            )
            .await?;

        let tracks: Vec<Track> = top
            .tracks
            .into_iter()
            .filter_map(|t| {
                let id = t.id.clone()?;
                let author = t
                    .artists
                    .iter()
                    .map(|a| a.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                let mut track = Track::catalog(id.clone(), t.name.clone(), author, None)
                    .with_provenance(Provenance::FavoriteArtist, None);
                track.cover_url = t.cover_url();
                track.canonical_url = t.canonical_url();
                track.external_id = Some(id);
                Some(track)
            })
            .collect();

        debug!("Artist {} has {} top tracks", artist_id, tracks.len());
        Ok(tracks)
    }
}

#[async_trait]
impl PlaylistClient for SpotifyClient {
    #[instrument(skip(self))]
    async fn ensure_playlist(&self, name: &str) -> Result<PlaylistHandle> {
        let user_id = self.current_user_id().await?;
        let playlists = self.list_playlists().await?;
        debug!("User {} has {} playlists", user_id, playlists.len());

        let candidates: Vec<&ApiPlaylist> = playlists
            .iter()
            .filter(|p| {
                p.name
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(name))
            })
            .collect();

        if candidates.len() > 1 {
            warn!(
                "Found {} playlists named '{}': {:?}",
                candidates.len(),
                name,
                candidates.iter().map(|p| p.id.as_deref()).collect::<Vec<_>>()
            );
        }

        if let Some(existing) = candidates.iter().find(|p| p.id.is_some()) {
            if let Some(id) = existing.id.clone() {
                return Ok(PlaylistHandle {
                    id,
                    url: existing
                        .external_urls
                        .as_ref()
                        .and_then(|u| u.spotify.clone()),
                });
            }
        }
        if !candidates.is_empty() {
            warn!("Every playlist named '{}' lacks an id; creating a new one", name);
        }

        let created = self.create_playlist(&user_id, name).await?;
        debug!("Created playlist {} for user {}", created.id, user_id);
        Ok(created)
    }

    #[instrument(skip(self, external_ids), fields(count = external_ids.len()))]
    async fn replace_tracks(&self, playlist_id: &str, external_ids: &[String]) -> Result<()> {
        let uris: Vec<String> = external_ids
            .iter()
            .map(|id| format!("spotify:track:{}", id))
            .collect();
        let request = self
            .http
            .put(format!("{}/v1/playlists/{}/tracks", self.base_url, playlist_id))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "uris": uris }));
        check_status(request.send().await?).await?;
        Ok(())
    }
}
