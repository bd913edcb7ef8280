//! End-to-end listening loop on the in-memory store

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use moodfade::models::{Provenance, Track};
use moodfade::recommendation::{
    BuildSettings, PlaylistBuilder, RecommendationService, Selection, SessionDraft, TrackKey,
};
use moodfade::store::{HistoryStore, MemoryStore};
use moodfade::streaming::{
    EnrichmentClient, PlaylistClient, PlaylistHandle, PlaylistSynchronizer, StreamingConnector,
    TrackMatch,
};
use moodfade::{Error, Mode, MoodLabel, Result};

/// Streaming stand-in that records the token it was opened with
#[derive(Default)]
struct FakeStreaming {
    tokens: Mutex<Vec<String>>,
    written: Mutex<Vec<String>>,
}

struct FakeClient {
    shared: Arc<FakeStreaming>,
}

#[async_trait]
impl EnrichmentClient for FakeClient {
    async fn search_track(&self, title: &str, _author: &str) -> Result<Option<TrackMatch>> {
        Ok(Some(TrackMatch {
            cover_url: Some(format!("https://img.example/{}.jpg", title)),
            canonical_url: None,
            external_id: Some(format!("ext-{}", title)),
        }))
    }

    async fn search_artist(&self, name: &str) -> Result<Option<String>> {
        Ok((name == "Portishead").then(|| "art-portishead".to_string()))
    }

    async fn top_tracks(&self, artist_id: &str) -> Result<Vec<Track>> {
        Ok((0..5)
            .map(|i| {
                let mut t = Track::catalog(
                    format!("{}-{}", artist_id, i),
                    format!("Roads {}", i),
                    "Portishead",
                    None,
                )
                .with_provenance(Provenance::FavoriteArtist, None);
                t.external_id = Some(t.id.clone());
                t
            })
            .collect())
    }
}

#[async_trait]
impl PlaylistClient for FakeClient {
    async fn ensure_playlist(&self, name: &str) -> Result<PlaylistHandle> {
        Ok(PlaylistHandle {
            id: format!("pl-{}", name),
            url: None,
        })
    }

    async fn replace_tracks(&self, _playlist_id: &str, external_ids: &[String]) -> Result<()> {
        *self.shared.written.lock().unwrap() = external_ids.to_vec();
        Ok(())
    }
}

struct FakeConnector(Arc<FakeStreaming>);

impl StreamingConnector for FakeConnector {
    fn enrichment(&self, access_token: &str) -> Arc<dyn EnrichmentClient> {
        self.0.tokens.lock().unwrap().push(access_token.to_string());
        Arc::new(FakeClient { shared: self.0.clone() })
    }

    fn playlists(&self, access_token: &str) -> Arc<dyn PlaylistClient> {
        self.0.tokens.lock().unwrap().push(access_token.to_string());
        Arc::new(FakeClient { shared: self.0.clone() })
    }
}

fn catalog() -> Vec<Track> {
    let mut tracks = Vec::new();
    for mood in MoodLabel::ALL {
        for i in 0..20 {
            tracks.push(Track::catalog(
                format!("{:?}-{}", mood, i),
                format!("{} {}", mood, i),
                "Catalog Artist",
                Some(mood),
            ));
        }
    }
    tracks
}

fn setup() -> (Arc<MemoryStore>, Arc<FakeStreaming>, RecommendationService) {
    let store = Arc::new(MemoryStore::with_tracks(catalog()));
    let streaming = Arc::new(FakeStreaming::default());
    let settings = BuildSettings {
        seed: Some(7),
        ..BuildSettings::default()
    };
    let service = RecommendationService::new(
        PlaylistBuilder::with_settings(store.clone(), settings),
        store.clone(),
        store.clone(),
    )
    .with_streaming(
        Arc::new(FakeConnector(streaming.clone())),
        PlaylistSynchronizer::new("Moodfade"),
    );
    (store, streaming, service)
}

#[tokio::test]
async fn regulation_build_mixes_pools_and_favorites() {
    let (_store, streaming, service) = setup();
    service
        .update_target_mood("u1", Some(MoodLabel::PositiveUplifting))
        .await
        .unwrap();
    service
        .update_favorite_artists("u1", "Portishead, Nobody Known")
        .await
        .unwrap();

    let selection = Selection {
        mood: MoodLabel::MelancholicDark,
        mode: Mode::Regulation,
    };
    let playlist = service
        .build_playlist("u1", selection, Some("tok-1"), &CancellationToken::new())
        .await
        .unwrap();

    let count = |p: Provenance| playlist.tracks.iter().filter(|t| t.provenance == p).count();
    assert_eq!(count(Provenance::CurrentPool), 12);
    assert_eq!(count(Provenance::BridgePool), 6);
    assert_eq!(count(Provenance::TargetPool), 12);
    assert_eq!(count(Provenance::FavoriteArtist), 3);
    assert!(playlist
        .tracks
        .iter()
        .filter(|t| t.provenance == Provenance::BridgePool)
        .all(|t| t.provenance_mood == Some(MoodLabel::CalmReflective)));
    assert!(playlist
        .tracks
        .iter()
        .filter(|t| t.provenance != Provenance::FavoriteArtist)
        .all(|t| t.cover_url.is_some() && t.external_id.is_some()));
    assert_eq!(streaming.tokens.lock().unwrap().as_slice(), ["tok-1"]);
}

#[tokio::test]
async fn listening_loop_bans_twice_disliked_tracks() {
    let (store, _streaming, service) = setup();
    let selection = Selection {
        mood: MoodLabel::CalmReflective,
        mode: Mode::Current,
    };

    let first = service
        .build_playlist("u1", selection, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(first.len(), 20);
    let disliked = first.tracks[0].clone();

    for _ in 0..2 {
        let mut draft = SessionDraft::new("u1", selection.mood, selection.mode, None, &first);
        draft.toggle_track(&disliked).unwrap();
        service
            .save_session(draft.finish(Some(moodfade::mood::FeedbackLabel::Negative)))
            .await
            .unwrap();
    }
    assert_eq!(store.recent_sessions("u1", None).await.unwrap().len(), 2);

    let second = service
        .build_playlist("u1", selection, None, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(second.len(), 19);
    let banned = TrackKey::for_track(&disliked);
    assert!(second.tracks.iter().all(|t| TrackKey::for_track(t) != banned));
}

#[tokio::test]
async fn trend_reflects_sessions_since_target_change() {
    let (_store, _streaming, service) = setup();
    service
        .update_target_mood("u1", Some(MoodLabel::CalmReflective))
        .await
        .unwrap();

    let selection = Selection {
        mood: MoodLabel::CalmReflective,
        mode: Mode::Current,
    };
    let playlist = service
        .build_playlist("u1", selection, None, &CancellationToken::new())
        .await
        .unwrap();
    for _ in 0..6 {
        let draft = SessionDraft::new(
            "u1",
            selection.mood,
            selection.mode,
            Some(MoodLabel::CalmReflective),
            &playlist,
        );
        service
            .save_session(draft.finish(Some(moodfade::mood::FeedbackLabel::VeryPositive)))
            .await
            .unwrap();
    }

    let report = service.trend("u1").await.unwrap().unwrap();
    assert_eq!(report.attempts, 6);
    assert_eq!(report.progress, 100);

    // a new target resets the fence
    service
        .update_target_mood("u1", Some(MoodLabel::EnergeticIntense))
        .await
        .unwrap();
    assert!(service.trend("u1").await.unwrap().is_none());
}

#[tokio::test]
async fn sync_uses_request_token_and_enriched_ids() {
    let (_store, streaming, service) = setup();
    let selection = Selection {
        mood: MoodLabel::EnergeticIntense,
        mode: Mode::Current,
    };
    let playlist = service
        .build_playlist("u1", selection, Some("tok-a"), &CancellationToken::new())
        .await
        .unwrap();

    let report = service
        .sync_playlist(&playlist, "tok-b", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.playlist_id, "pl-Moodfade");
    assert_eq!(report.pushed, playlist.len());
    assert_eq!(report.skipped, 0);
    let written = streaming.written.lock().unwrap().clone();
    assert_eq!(written.len(), playlist.len());
    assert!(written.iter().all(|id| id.starts_with("ext-")));
    assert_eq!(
        streaming.tokens.lock().unwrap().as_slice(),
        ["tok-a", "tok-b", "tok-b"]
    );
}

#[tokio::test]
async fn cancelled_build_reports_cancellation() {
    let (_store, _streaming, service) = setup();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = service
        .build_playlist(
            "u1",
            Selection {
                mood: MoodLabel::CalmReflective,
                mode: Mode::Current,
            },
            None,
            &cancel,
        )
        .await;
    assert!(matches!(result, Err(Error::Cancelled)));
}
