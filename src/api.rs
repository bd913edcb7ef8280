//! HTTP API Server for Playlists
//!
//! REST endpoints for the app: playlist builds, streaming sync, trend,
//! sessions and profile edits. The streaming access token travels in the
//! `x-streaming-token` header on every request that needs it.

use axum::{
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ApiConfig;
use crate::database::Database;
use crate::error::{Error, Result};
use crate::models::{NewSession, SessionRecord, Track, UserProfile};
use crate::mood::{Mode, MoodLabel};
use crate::recommendation::trend::TrendReport;
use crate::recommendation::{PlaylistController, Selection};
use crate::streaming::SyncReport;

pub const STREAMING_TOKEN_HEADER: &str = "x-streaming-token";

/// Shared application state
pub struct AppState {
    pub controller: PlaylistController,
    pub database: Option<Database>,
}

/// Query params for playlist endpoints
#[derive(Debug, Deserialize)]
pub struct PlaylistQuery {
    pub mood: String,
    pub mode: Option<String>,
}

impl PlaylistQuery {
    fn selection(&self) -> Result<Selection> {
        let mood = self.mood.parse::<MoodLabel>()?;
        let mode = match self.mode.as_deref() {
            Some(raw) => raw.parse::<Mode>()?,
            None => Mode::Current,
        };
        Ok(Selection { mood, mode })
    }
}

#[derive(Debug, Serialize)]
pub struct PlaylistResponse {
    pub mood: MoodLabel,
    pub mode: Mode,
    pub count: usize,
    pub tracks: Vec<Track>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub count: usize,
    #[serde(flatten)]
    pub report: SyncReport,
}

#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub user_id: String,
    pub trend: Option<TrendReport>,
}

#[derive(Debug, Serialize)]
pub struct MoodEntry {
    pub mood: MoodLabel,
    pub bridge: MoodLabel,
}

#[derive(Debug, Deserialize)]
pub struct TargetMoodRequest {
    /// `null` clears the target
    pub target_mood: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteArtistsRequest {
    /// Comma-separated artist names
    pub artists: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: Option<bool>,
}

/// Build the router
pub fn router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/moods", get(list_moods))
        .route("/api/v1/playlist/:user_id", get(get_playlist))
        .route("/api/v1/playlist/:user_id/sync", post(sync_playlist))
        .route("/api/v1/trend/:user_id", get(get_trend))
        .route("/api/v1/sessions", post(save_session))
        .route("/api/v1/profile/:user_id", get(get_profile))
        .route(
            "/api/v1/profile/:user_id/target-mood",
            put(update_target_mood),
        )
        .route(
            "/api/v1/profile/:user_id/favorite-artists",
            put(update_favorite_artists),
        )
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        app = app.layer(cors_layer(&config.cors_origins));
    }

    app.with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", o);
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Start the API server; returns once `shutdown` fires and requests drain
pub async fn start_server(
    state: Arc<AppState>,
    config: &ApiConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = router(state, config);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting playlist API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(Error::internal)?;

    Ok(())
}

fn streaming_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(STREAMING_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Health check endpoint
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };
    let status = if database == Some(false) {
        "degraded"
    } else {
        "healthy"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

async fn list_moods() -> Json<Vec<MoodEntry>> {
    Json(
        MoodLabel::ALL
            .into_iter()
            .map(|mood| MoodEntry {
                mood,
                bridge: mood.bridge(),
            })
            .collect(),
    )
}

/// Build a playlist; a newer request for the same user supersedes this one
async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<PlaylistQuery>,
    headers: HeaderMap,
) -> Result<Json<PlaylistResponse>> {
    let selection = query.selection()?;
    let playlist = state
        .controller
        .build(&user_id, selection, streaming_token(&headers))
        .await?;

    Ok(Json(PlaylistResponse {
        mood: selection.mood,
        mode: selection.mode,
        count: playlist.len(),
        tracks: playlist.tracks.clone(),
    }))
}

/// Build a playlist and push it to the user's streaming account
async fn sync_playlist(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<PlaylistQuery>,
    headers: HeaderMap,
) -> Result<Json<SyncResponse>> {
    let selection = query.selection()?;
    let token = streaming_token(&headers).ok_or_else(|| Error::Unauthorized {
        message: format!("Missing {} header", STREAMING_TOKEN_HEADER).into(),
    })?;

    let playlist = state
        .controller
        .build(&user_id, selection, Some(token.clone()))
        .await?;
    let report = state
        .controller
        .service()
        .sync_playlist(&playlist, &token, &CancellationToken::new())
        .await?;

    Ok(Json(SyncResponse {
        count: playlist.len(),
        report,
    }))
}

async fn get_trend(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<TrendResponse>> {
    let trend = state.controller.service().trend(&user_id).await?;
    Ok(Json(TrendResponse { user_id, trend }))
}

async fn save_session(
    State(state): State<Arc<AppState>>,
    Json(session): Json<NewSession>,
) -> Result<(StatusCode, Json<SessionRecord>)> {
    let record = state.controller.service().save_session(session).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserProfile>> {
    Ok(Json(state.controller.service().get_profile(&user_id).await?))
}

async fn update_target_mood(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<TargetMoodRequest>,
) -> Result<Json<UserProfile>> {
    let mood = req
        .target_mood
        .as_deref()
        .map(str::parse::<MoodLabel>)
        .transpose()?;
    let profile = state
        .controller
        .service()
        .update_target_mood(&user_id, mood)
        .await?;
    Ok(Json(profile))
}

async fn update_favorite_artists(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Json(req): Json<FavoriteArtistsRequest>,
) -> Result<Json<UserProfile>> {
    let profile = state
        .controller
        .service()
        .update_favorite_artists(&user_id, &req.artists)
        .await?;
    Ok(Json(profile))
}
