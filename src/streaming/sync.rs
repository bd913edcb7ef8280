//! Playlist Synchronizer
//!
//! Pushes a finished playlist to the user's streaming-service playlist,
//! creating it when absent. Tracks without a known external id are resolved
//! by title/author search; misses are skipped.

use serde::Serialize;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EnrichmentClient, PlaylistClient};
use crate::error::{Error, Result};
use crate::models::Playlist;
use crate::recommendation::metrics::PerformanceTimer;

pub const DEFAULT_PLAYLIST_NAME: &str = "Moodfade";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub playlist_id: String,
    pub playlist_url: Option<String>,
    /// Track ids written, in playlist order
    pub pushed: usize,
    /// Tracks that could not be resolved to an external id
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct PlaylistSynchronizer {
    playlist_name: String,
}

impl Default for PlaylistSynchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYLIST_NAME)
    }
}

impl PlaylistSynchronizer {
    pub fn new(playlist_name: impl Into<String>) -> Self {
        Self {
            playlist_name: playlist_name.into(),
        }
    }

    pub fn playlist_name(&self) -> &str {
        &self.playlist_name
    }

    pub async fn sync(
        &self,
        playlist: &Playlist,
        playlists: &dyn PlaylistClient,
        enrichment: &dyn EnrichmentClient,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let _timer = PerformanceTimer::new("playlist_sync");

        let (ids, skipped) = resolve_external_ids(playlist, enrichment, cancel).await?;

        let handle = playlists.ensure_playlist(&self.playlist_name).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if ids.is_empty() {
            warn!(
                "No tracks resolved for playlist {}; leaving it unchanged",
                handle.id
            );
        } else {
            playlists.replace_tracks(&handle.id, &ids).await?;
            info!(
                "Synced {} tracks to playlist '{}' ({}), {} skipped",
                ids.len(),
                self.playlist_name,
                handle.id,
                skipped
            );
        }

        Ok(SyncReport {
            playlist_id: handle.id,
            playlist_url: handle.url,
            pushed: ids.len(),
            skipped,
        })
    }
}

/// External ids in playlist order without repeats, plus the number of
/// tracks that could not be resolved.
async fn resolve_external_ids(
    playlist: &Playlist,
    enrichment: &dyn EnrichmentClient,
    cancel: &CancellationToken,
) -> Result<(Vec<String>, usize)> {
    let mut ids = Vec::with_capacity(playlist.len());
    let mut seen = HashSet::new();
    let mut skipped = 0;

    for track in &playlist.tracks {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let id = match &track.external_id {
            Some(id) => Some(id.clone()),
            None => match enrichment.search_track(&track.title, &track.author).await {
                Ok(found) => found.and_then(|m| m.external_id),
                Err(e) => {
                    warn!("Lookup failed for '{} - {}': {}", track.title, track.author, e);
                    None
                }
            },
        };

        match id {
            Some(id) => {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
            None => {
                debug!("No streaming match for '{} - {}'", track.title, track.author);
                skipped += 1;
            }
        }
    }

    Ok((ids, skipped))
}
