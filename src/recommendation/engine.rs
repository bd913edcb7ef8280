//! Playlist Builder
//!
//! Assembles one playlist for a (mood, mode) selection:
//!
//! 1. **Pools** - catalog tracks for the current mood, or current/bridge/target
//!    pools with fixed quotas in regulation mode
//! 2. **Enrichment** - cover art and links from the streaming service, looked
//!    up with bounded concurrency
//! 3. **Favorite artists** - a few top tracks per favorite artist
//! 4. **Merge + dedup** by track id, first occurrence wins
//! 5. **Scoring** - feedback tally bias; tracks disliked twice are banned
//! 6. **Ranking** - score plus a small random jitter, truncated
//!
//! Individual lookups never fail a build. The only error a build returns is
//! [`Error::Cancelled`].

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use super::feedback::FeedbackTally;
use super::keys::TrackKey;
use super::metrics::{BuildMetrics, PerformanceTimer};
use crate::error::{Error, Result};
use crate::models::{Playlist, Provenance, Track};
use crate::mood::{Mode, MoodLabel};
use crate::store::CatalogStore;
use crate::streaming::{EnrichmentClient, TrackMatch};

/// Score every surviving track starts from
pub const BASE_SCORE: f64 = 1.0;
/// Dislike count at which a track is excluded outright
pub const BAN_THRESHOLD: u32 = 2;
/// Penalty for exactly one dislike
pub const SINGLE_DISLIKE_PENALTY: f64 = 0.4;
/// Like count that earns [`LIKE_BONUS`]
pub const LIKE_BONUS_THRESHOLD: u32 = 3;
pub const LIKE_BONUS: f64 = 0.3;
/// Multiplier on the track mood's normalized sentiment
pub const SENTIMENT_WEIGHT: f64 = 0.3;

/// Quotas and limits for a build
#[derive(Debug, Clone, PartialEq)]
pub struct BuildSettings {
    /// Pool size when staying in the current mood
    pub current_quota: usize,
    /// Regulation mode quotas, in pool order
    pub regulation_current_quota: usize,
    pub bridge_quota: usize,
    pub target_quota: usize,
    pub max_favorite_artists: usize,
    pub tracks_per_artist: usize,
    pub max_playlist_len: usize,
    /// Upper bound (exclusive) of the per-track ranking jitter
    pub jitter: f64,
    pub max_concurrent_lookups: usize,
    /// Fixed RNG seed for reproducible shuffles and jitter
    pub seed: Option<u64>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            current_quota: 30,
            regulation_current_quota: 12,
            bridge_quota: 6,
            target_quota: 12,
            max_favorite_artists: 5,
            tracks_per_artist: 3,
            max_playlist_len: 45,
            jitter: 0.1,
            max_concurrent_lookups: 8,
            seed: None,
        }
    }
}

/// What the user selected
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub current_mood: MoodLabel,
    pub target_mood: Option<MoodLabel>,
    pub mode: Mode,
    pub favorite_artists: Vec<String>,
}

impl BuildRequest {
    pub fn current(mood: MoodLabel) -> Self {
        Self {
            current_mood: mood,
            target_mood: None,
            mode: Mode::Current,
            favorite_artists: Vec::new(),
        }
    }

    pub fn regulation(current: MoodLabel, target: MoodLabel) -> Self {
        Self {
            current_mood: current,
            target_mood: Some(target),
            mode: Mode::Regulation,
            favorite_artists: Vec::new(),
        }
    }

    pub fn with_favorite_artists(mut self, artists: Vec<String>) -> Self {
        self.favorite_artists = artists;
        self
    }

    /// `(mood, provenance, quota)` for each pool, in concatenation order.
    /// Regulation without a target degrades to the current-mood plan.
    fn pool_plan(&self, settings: &BuildSettings) -> Vec<(MoodLabel, Provenance, usize)> {
        match (self.mode, self.target_mood) {
            (Mode::Regulation, Some(target)) => vec![
                (
                    self.current_mood,
                    Provenance::CurrentPool,
                    settings.regulation_current_quota,
                ),
                (
                    self.current_mood.bridge(),
                    Provenance::BridgePool,
                    settings.bridge_quota,
                ),
                (target, Provenance::TargetPool, settings.target_quota),
            ],
            _ => vec![(
                self.current_mood,
                Provenance::CurrentPool,
                settings.current_quota,
            )],
        }
    }
}

/// Builds playlists from the catalog, an optional enrichment client and a
/// feedback tally
#[derive(Clone)]
pub struct PlaylistBuilder {
    catalog: Arc<dyn CatalogStore>,
    settings: BuildSettings,
}

impl PlaylistBuilder {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self {
            catalog,
            settings: BuildSettings::default(),
        }
    }

    pub fn with_settings(catalog: Arc<dyn CatalogStore>, settings: BuildSettings) -> Self {
        Self { catalog, settings }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    /// Build a playlist. Without an enrichment client, covers and links stay
    /// empty and no favorite-artist tracks are added.
    #[instrument(skip_all, fields(mood = %request.current_mood, mode = %request.mode))]
    pub async fn build(
        &self,
        request: &BuildRequest,
        tally: &FeedbackTally,
        enrichment: Option<Arc<dyn EnrichmentClient>>,
        cancel: &CancellationToken,
    ) -> Result<Playlist> {
        let timer = PerformanceTimer::new("playlist_build");
        let mut metrics = BuildMetrics::default();
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        // 1. Pools
        let pool_timer = PerformanceTimer::new("pool_fetch");
        let mut pool = Vec::new();
        for (mood, provenance, quota) in request.pool_plan(&self.settings) {
            let mut tracks = self.fetch_pool(mood, cancel).await?;
            tracks.shuffle(&mut rng);
            tracks.truncate(quota);
            pool.extend(
                tracks
                    .into_iter()
                    .map(|t| t.with_provenance(provenance, Some(mood))),
            );
        }
        metrics.pool_tracks = pool.len();
        metrics.pool_fetch_ms = pool_timer.elapsed_ms();

        // 2 + 3. Enrichment and favorite artists
        let mut favorites = Vec::new();
        if let Some(client) = enrichment {
            let enrich_timer = PerformanceTimer::new("enrichment");
            self.enrich(&mut pool, &client, cancel, &mut metrics).await?;
            metrics.enrichment_ms = enrich_timer.elapsed_ms();

            let favorites_timer = PerformanceTimer::new("favorite_artists");
            favorites = self
                .favorite_artist_tracks(&request.favorite_artists, &client, &mut rng, cancel, &mut metrics)
                .await?;
            metrics.favorites_ms = favorites_timer.elapsed_ms();
        } else {
            debug!("No enrichment client; skipping covers and favorite artists");
        }
        metrics.favorite_tracks = favorites.len();

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        // 4. Merge + dedup
        let merged_len = pool.len() + favorites.len();
        pool.extend(favorites);
        let merged = dedup_by_id(pool);
        metrics.duplicates_dropped = merged_len - merged.len();

        // 5. Scoring
        let mut scored = Vec::with_capacity(merged.len());
        for mut track in merged {
            match score_track(&track, tally) {
                Some(score) => {
                    track.score = score;
                    scored.push(track);
                }
                None => {
                    debug!("Banned: {} - {}", track.title, track.author);
                    metrics.banned += 1;
                }
            }
        }

        // 6. Ranking + truncation
        let tracks = rank(
            scored,
            &mut rng,
            self.settings.jitter,
            self.settings.max_playlist_len,
        );

        metrics.record_output(&tracks);
        metrics.total_duration_ms = timer.elapsed_ms();
        metrics.log_summary();
        for track in &tracks {
            debug!("{}", track.describe());
        }

        Ok(Playlist { tracks })
    }

    /// A pool fetch failure is logged and treated as an empty pool
    async fn fetch_pool(&self, mood: MoodLabel, cancel: &CancellationToken) -> Result<Vec<Track>> {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.catalog.tracks_by_mood(mood) => result,
        };
        match result {
            Ok(tracks) => Ok(tracks),
            Err(e) => {
                warn!("Catalog query for {} failed: {}", mood, e);
                Ok(Vec::new())
            }
        }
    }

    /// Attach cover and links in place. Lookups run concurrently (bounded);
    /// results are written back by index so order never depends on timing.
    async fn enrich(
        &self,
        tracks: &mut [Track],
        client: &Arc<dyn EnrichmentClient>,
        cancel: &CancellationToken,
        metrics: &mut BuildMetrics,
    ) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_lookups.max(1)));
        let mut set = JoinSet::new();

        for (idx, track) in tracks.iter().enumerate() {
            let client = client.clone();
            let semaphore = semaphore.clone();
            let title = track.title.clone();
            let author = track.author.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (idx, client.search_track(&title, &author).await)
            });
        }

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                joined = set.join_next() => Some(joined),
            };
            let Some(joined) = next else {
                set.abort_all();
                return Err(Error::Cancelled);
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((idx, Ok(Some(found)))) => {
                    if let Some(track) = tracks.get_mut(idx) {
                        if apply_match(track, found) {
                            metrics.enrichment_hits += 1;
                        } else {
                            debug!("Match without cover for '{} - {}'", track.title, track.author);
                        }
                    }
                }
                Ok((idx, Ok(None))) => {
                    if let Some(track) = tracks.get(idx) {
                        debug!("No match for '{} - {}'", track.title, track.author);
                    }
                }
                Ok((idx, Err(e))) => {
                    metrics.enrichment_failures += 1;
                    if let Some(track) = tracks.get(idx) {
                        if e.is_transient() {
                            warn!("Enrichment failed for '{} - {}': {}", track.title, track.author, e);
                        } else {
                            error!("Enrichment error for '{} - {}': {}", track.title, track.author, e);
                        }
                    }
                }
                Err(e) => {
                    metrics.enrichment_failures += 1;
                    warn!("Enrichment task failed: {}", e);
                }
            }
        }

        Ok(())
    }

    /// Up to `tracks_per_artist` random top tracks for each of the first
    /// `max_favorite_artists` artists, kept in artist order.
    async fn favorite_artist_tracks(
        &self,
        artists: &[String],
        client: &Arc<dyn EnrichmentClient>,
        rng: &mut StdRng,
        cancel: &CancellationToken,
        metrics: &mut BuildMetrics,
    ) -> Result<Vec<Track>> {
        let names: Vec<String> = artists
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .take(self.settings.max_favorite_artists)
            .map(str::to_string)
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_lookups.max(1)));
        let mut set = JoinSet::new();
        for (idx, name) in names.iter().enumerate() {
            let client = client.clone();
            let semaphore = semaphore.clone();
            let name = name.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let top = match client.search_artist(&name).await {
                    Ok(Some(artist_id)) => client.top_tracks(&artist_id).await.map(Some),
                    Ok(None) => Ok(None),
                    Err(e) => Err(e),
                };
                (idx, top)
            });
        }

        let mut per_artist: Vec<Vec<Track>> = vec![Vec::new(); names.len()];
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => None,
                joined = set.join_next() => Some(joined),
            };
            let Some(joined) = next else {
                set.abort_all();
                return Err(Error::Cancelled);
            };
            let Some(joined) = joined else { break };

            match joined {
                Ok((idx, Ok(Some(tracks)))) => {
                    metrics.favorite_artists_resolved += 1;
                    if let Some(slot) = per_artist.get_mut(idx) {
                        *slot = tracks;
                    }
                }
                Ok((idx, Ok(None))) => {
                    warn!("Favorite artist '{}' not found", names[idx]);
                }
                Ok((idx, Err(e))) if e.is_transient() => {
                    warn!("Favorite artist '{}' lookup failed: {}", names[idx], e);
                }
                Ok((idx, Err(e))) => {
                    error!("Favorite artist '{}' lookup error: {}", names[idx], e);
                }
                Err(e) => warn!("Favorite artist task failed: {}", e),
            }
        }

        let mut out = Vec::new();
        for mut tracks in per_artist {
            tracks.shuffle(rng);
            tracks.truncate(self.settings.tracks_per_artist);
            out.extend(
                tracks
                    .into_iter()
                    .map(|t| t.with_provenance(Provenance::FavoriteArtist, None)),
            );
        }
        Ok(out)
    }
}

/// A match only counts when it carries a cover; otherwise the track stays as
/// it was. Returns whether the track was enriched.
fn apply_match(track: &mut Track, found: TrackMatch) -> bool {
    let Some(cover_url) = found.cover_url else {
        return false;
    };
    track.cover_url = Some(cover_url);
    track.canonical_url = found.canonical_url;
    if found.external_id.is_some() {
        track.external_id = found.external_id;
    }
    true
}

/// Keep the first occurrence of each id, preserving order
pub fn dedup_by_id(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::with_capacity(tracks.len());
    tracks
        .into_iter()
        .filter(|t| seen.insert(t.id.clone()))
        .collect()
}

/// Feedback score for one track, or `None` when the track is banned
pub fn score_track(track: &Track, tally: &FeedbackTally) -> Option<f64> {
    let stats = tally.stats(&TrackKey::for_track(track));
    if stats.dislikes >= BAN_THRESHOLD {
        return None;
    }

    let mut score = BASE_SCORE;
    if stats.dislikes == 1 {
        score -= SINGLE_DISLIKE_PENALTY;
    }
    if stats.likes >= LIKE_BONUS_THRESHOLD {
        score += LIKE_BONUS;
    }
    score += SENTIMENT_WEIGHT * tally.sentiment(track.mood_category);
    Some(score)
}

/// Sort by score plus a jitter drawn once per track, then truncate
fn rank<R: Rng>(tracks: Vec<Track>, rng: &mut R, jitter: f64, limit: usize) -> Vec<Track> {
    let mut keyed: Vec<(f64, Track)> = tracks
        .into_iter()
        .map(|t| {
            let noise = if jitter > 0.0 { rng.gen_range(0.0..jitter) } else { 0.0 };
            (t.score + noise, t)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().take(limit).map(|(_, t)| t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionRecord;
    use crate::recommendation::feedback::{aggregate, MoodAttribution};
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::time::Duration;

    fn catalog(per_mood: usize) -> Arc<MemoryStore> {
        let mut tracks = Vec::new();
        for mood in MoodLabel::ALL {
            for i in 0..per_mood {
                tracks.push(Track::catalog(
                    format!("{:?}-{}", mood, i),
                    format!("{} song {}", mood, i),
                    "Catalog Artist",
                    Some(mood),
                ));
            }
        }
        Arc::new(MemoryStore::with_tracks(tracks))
    }

    fn seeded(seed: u64) -> BuildSettings {
        BuildSettings {
            seed: Some(seed),
            ..BuildSettings::default()
        }
    }

    #[derive(Default)]
    struct FakeEnrichment {
        artists: HashMap<String, Vec<Track>>,
        failing_artists: Vec<String>,
        delay: Option<Duration>,
    }

    impl FakeEnrichment {
        fn with_artist(mut self, name: &str, count: usize) -> Self {
            let tracks = (0..count)
                .map(|i| {
                    let mut t = Track::catalog(format!("{}-top-{}", name, i), format!("Hit {}", i), name, None);
                    t.external_id = Some(t.id.clone());
                    t
                })
                .collect();
            self.artists.insert(name.to_string(), tracks);
            self
        }
    }

    #[async_trait]
    impl EnrichmentClient for FakeEnrichment {
        async fn search_track(&self, title: &str, _author: &str) -> Result<Option<TrackMatch>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if title.ends_with(" 0") {
                return Err(Error::streaming_status(503, "unavailable"));
            }
            if title.ends_with(" 1") {
                return Ok(Some(TrackMatch {
                    cover_url: None,
                    canonical_url: Some(format!("https://open/{}", title)),
                    external_id: Some(format!("ext-{}", title)),
                }));
            }
            Ok(Some(TrackMatch {
                cover_url: Some(format!("https://img/{}", title)),
                canonical_url: Some(format!("https://open/{}", title)),
                external_id: Some(format!("ext-{}", title)),
            }))
        }

        async fn search_artist(&self, name: &str) -> Result<Option<String>> {
            if self.failing_artists.iter().any(|a| a == name) {
                return Err(Error::streaming("search failed"));
            }
            Ok(self.artists.contains_key(name).then(|| name.to_string()))
        }

        async fn top_tracks(&self, artist_id: &str) -> Result<Vec<Track>> {
            Ok(self.artists.get(artist_id).cloned().unwrap_or_default())
        }
    }

    fn disliked_twice(key: &str) -> FeedbackTally {
        let session = SessionRecord {
            id: "s".to_string(),
            user_id: "u".to_string(),
            mood: None,
            mode: None,
            target_mood_snapshot: None,
            feedback: None,
            liked_track_keys: vec![],
            disliked_track_keys: vec![key.to_string()],
            created_at: Utc::now(),
        };
        aggregate(&[session.clone(), session], MoodAttribution::SplitRegulation)
    }

    #[tokio::test]
    async fn test_current_mode_without_history() {
        let builder = PlaylistBuilder::new(catalog(40));
        let playlist = builder
            .build(
                &BuildRequest::current(MoodLabel::CalmReflective),
                &FeedbackTally::default(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(playlist.len(), 30);
        for track in &playlist.tracks {
            assert_eq!(track.provenance, Provenance::CurrentPool);
            assert_eq!(track.mood_category, Some(MoodLabel::CalmReflective));
            assert_eq!(track.score, BASE_SCORE);
            assert!(track.cover_url.is_none());
        }
    }

    #[tokio::test]
    async fn test_regulation_pool_quotas() {
        let builder = PlaylistBuilder::with_settings(catalog(20), seeded(7));
        let request = BuildRequest::regulation(MoodLabel::MelancholicDark, MoodLabel::PositiveUplifting);
        let playlist = builder
            .build(&request, &FeedbackTally::default(), None, &CancellationToken::new())
            .await
            .unwrap();

        let count = |p: Provenance| playlist.tracks.iter().filter(|t| t.provenance == p).count();
        assert_eq!(count(Provenance::CurrentPool), 12);
        assert_eq!(count(Provenance::BridgePool), 6);
        assert_eq!(count(Provenance::TargetPool), 12);
        for t in playlist.tracks.iter().filter(|t| t.provenance == Provenance::BridgePool) {
            assert_eq!(t.provenance_mood, Some(MoodLabel::CalmReflective));
        }
    }

    #[tokio::test]
    async fn test_regulation_without_target_uses_current_plan() {
        let builder = PlaylistBuilder::new(catalog(40));
        let mut request = BuildRequest::current(MoodLabel::EnergeticIntense);
        request.mode = Mode::Regulation;
        let playlist = builder
            .build(&request, &FeedbackTally::default(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(playlist.len(), 30);
        assert!(playlist.tracks.iter().all(|t| t.provenance == Provenance::CurrentPool));
    }

    #[tokio::test]
    async fn test_twice_disliked_track_never_appears() {
        let store = Arc::new(MemoryStore::with_tracks(vec![
            Track::catalog("banned", "Song A", "Artist X", Some(MoodLabel::CalmReflective)),
            Track::catalog("ok", "Song B", "Artist X", Some(MoodLabel::CalmReflective)),
        ]));
        let tally = disliked_twice("Song A__Artist X");

        for seed in 0..25 {
            let builder = PlaylistBuilder::with_settings(store.clone(), seeded(seed));
            let playlist = builder
                .build(
                    &BuildRequest::current(MoodLabel::CalmReflective),
                    &tally,
                    None,
                    &CancellationToken::new(),
                )
                .await
                .unwrap();
            assert_eq!(playlist.len(), 1);
            assert_eq!(playlist.tracks[0].id, "ok");
        }
    }

    #[test]
    fn test_score_track_rules() {
        let track = Track::catalog("1", "T", "A", Some(MoodLabel::CalmReflective));
        let key = "T__A".to_string();
        let session = |liked: Vec<String>, disliked: Vec<String>| SessionRecord {
            id: "s".to_string(),
            user_id: "u".to_string(),
            mood: Some(MoodLabel::CalmReflective),
            mode: Some(Mode::Current),
            target_mood_snapshot: None,
            feedback: Some(crate::mood::FeedbackLabel::Positive),
            liked_track_keys: liked,
            disliked_track_keys: disliked,
            created_at: Utc::now(),
        };

        // one dislike plus full positive sentiment for the mood
        let tally = aggregate(&[session(vec![], vec![key.clone()])], MoodAttribution::SplitRegulation);
        let score = score_track(&track, &tally).unwrap();
        assert!((score - (1.0 - 0.4 + 0.3)).abs() < 1e-9);

        // three likes
        let sessions: Vec<_> = (0..3).map(|_| session(vec![key.clone()], vec![])).collect();
        let tally = aggregate(&sessions, MoodAttribution::SplitRegulation);
        let score = score_track(&track, &tally).unwrap();
        assert!((score - (1.0 + 0.3 + 0.3)).abs() < 1e-9);

        // untagged track ignores sentiment
        let untagged = Track::catalog("2", "U", "A", None);
        assert_eq!(score_track(&untagged, &tally), Some(BASE_SCORE));
    }

    #[test]
    fn test_dedup_keeps_first_and_is_idempotent() {
        let pool = Track::catalog("x", "Pool", "A", Some(MoodLabel::CalmReflective));
        let fav = Track::catalog("x", "Fav", "A", None).with_provenance(Provenance::FavoriteArtist, None);
        let other = Track::catalog("y", "Other", "B", None);

        let once = dedup_by_id(vec![pool, fav, other]);
        assert_eq!(once.len(), 2);
        assert_eq!(once[0].title, "Pool");
        assert_eq!(once[0].provenance, Provenance::CurrentPool);

        let twice = dedup_by_id(once.clone());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_enrichment_and_favorite_artists() {
        let store = catalog(5);
        // a favorite track that duplicates a pool id must lose to the pool copy
        let mut dup = Track::catalog("CalmReflective-1", "Dup", "Björk", None);
        dup.external_id = Some("dup".to_string());
        let mut fake = FakeEnrichment::default()
            .with_artist("Björk", 6)
            .with_artist("Massive Attack", 2);
        fake.artists.get_mut("Björk").unwrap().push(dup);
        fake.failing_artists.push("Broken".to_string());
        let fake: Arc<dyn EnrichmentClient> = Arc::new(fake);

        let request = BuildRequest::current(MoodLabel::CalmReflective).with_favorite_artists(vec![
            "Broken".to_string(),
            " Björk ".to_string(),
            "".to_string(),
            "Unknown".to_string(),
            "Massive Attack".to_string(),
        ]);
        let builder = PlaylistBuilder::with_settings(store, seeded(3));
        let playlist = builder
            .build(&request, &FeedbackTally::default(), Some(fake), &CancellationToken::new())
            .await
            .unwrap();

        let pool: Vec<_> = playlist.tracks.iter().filter(|t| t.provenance == Provenance::CurrentPool).collect();
        assert_eq!(pool.len(), 5);
        for t in &pool {
            if t.title.ends_with(" 0") {
                assert!(t.cover_url.is_none());
            } else if t.title.ends_with(" 1") {
                // hit without a cover leaves the track untouched
                assert!(t.cover_url.is_none());
                assert!(t.canonical_url.is_none());
                assert!(t.external_id.is_none());
            } else {
                assert_eq!(t.cover_url.as_deref(), Some(format!("https://img/{}", t.title).as_str()));
                assert!(t.external_id.is_some());
            }
        }

        let favorites: Vec<_> = playlist.tracks.iter().filter(|t| t.provenance == Provenance::FavoriteArtist).collect();
        let bjork = favorites.iter().filter(|t| t.author == "Björk").count();
        let massive = favorites.iter().filter(|t| t.author == "Massive Attack").count();
        assert!(bjork <= 3 && bjork >= 2);
        assert_eq!(massive, 2);

        let ids: HashSet<_> = playlist.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), playlist.len());
    }

    #[test]
    fn test_coverless_match_is_not_applied() {
        let mut track = Track::catalog("t1", "Song", "Band", Some(MoodLabel::CalmReflective));
        let applied = apply_match(
            &mut track,
            TrackMatch {
                cover_url: None,
                canonical_url: Some("https://open/t1".to_string()),
                external_id: Some("ext-t1".to_string()),
            },
        );
        assert!(!applied);
        assert!(track.cover_url.is_none());
        assert!(track.canonical_url.is_none());
        assert!(track.external_id.is_none());

        assert!(apply_match(
            &mut track,
            TrackMatch {
                cover_url: Some("https://img/t1".to_string()),
                canonical_url: None,
                external_id: None,
            },
        ));
        assert_eq!(track.cover_url.as_deref(), Some("https://img/t1"));
        assert!(track.external_id.is_none());
    }

    #[tokio::test]
    async fn test_output_is_bounded() {
        let settings = BuildSettings {
            max_playlist_len: 10,
            seed: Some(1),
            ..BuildSettings::default()
        };
        let builder = PlaylistBuilder::with_settings(catalog(40), settings);
        let playlist = builder
            .build(
                &BuildRequest::current(MoodLabel::PositiveUplifting),
                &FeedbackTally::default(),
                None,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(playlist.len(), 10);

        let fake: Arc<dyn EnrichmentClient> = Arc::new(
            (0..6).fold(FakeEnrichment::default(), |f, i| f.with_artist(&format!("Artist {}", i), 10)),
        );
        let artists = (0..6).map(|i| format!("Artist {}", i)).collect();
        let playlist = PlaylistBuilder::new(catalog(40))
            .build(
                &BuildRequest::current(MoodLabel::PositiveUplifting).with_favorite_artists(artists),
                &FeedbackTally::default(),
                Some(fake),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        // 30 pool + 5 artists * 3
        assert_eq!(playlist.len(), 45);
    }

    #[tokio::test]
    async fn test_same_seed_same_playlist() {
        let store = catalog(40);
        let request = BuildRequest::regulation(MoodLabel::EnergeticIntense, MoodLabel::CalmReflective);
        let a = PlaylistBuilder::with_settings(store.clone(), seeded(42))
            .build(&request, &FeedbackTally::default(), None, &CancellationToken::new())
            .await
            .unwrap();
        let b = PlaylistBuilder::with_settings(store, seeded(42))
            .build(&request, &FeedbackTally::default(), None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = PlaylistBuilder::new(catalog(5))
            .build(
                &BuildRequest::current(MoodLabel::CalmReflective),
                &FeedbackTally::default(),
                None,
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_aborts_inflight_enrichment() {
        let fake: Arc<dyn EnrichmentClient> = Arc::new(FakeEnrichment {
            delay: Some(Duration::from_secs(30)),
            ..FakeEnrichment::default()
        });
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let result = PlaylistBuilder::new(catalog(5))
            .build(
                &BuildRequest::current(MoodLabel::CalmReflective),
                &FeedbackTally::default(),
                Some(fake),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
