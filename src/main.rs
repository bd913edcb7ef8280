//! Moodfade Engine
//!
//! Mood-based playlist service.
//!
//! # Architecture
//!
//! - **Stores**: Postgres when `DATABASE_URL` is set, otherwise in-memory
//! - **Recommendation**: feedback aggregation, playlist builds, trend scoring
//! - **Streaming**: Spotify Web API for enrichment and playlist sync
//! - **API Server**: REST endpoints for the app
//!
//! # Graceful Shutdown
//!
//! SIGTERM and SIGINT stop the listener, let in-flight requests drain and
//! close the database pool.

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use moodfade::api::{self, AppState};
use moodfade::database::{self, Database};
use moodfade::error::Result;
use moodfade::recommendation::{PlaylistBuilder, PlaylistController, RecommendationService};
use moodfade::store::{CatalogStore, HistoryStore, MemoryStore, PgStore, ProfileStore};
use moodfade::streaming::{PlaylistSynchronizer, SpotifyConnector};
use moodfade::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Moodfade Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);
    info!("Configuration loaded and validated");

    let shutdown = CancellationToken::new();

    // Stores
    let (catalog, history, profiles, db): (
        Arc<dyn CatalogStore>,
        Arc<dyn HistoryStore>,
        Arc<dyn ProfileStore>,
        Option<Database>,
    ) = match &config.database {
        Some(db_config) => {
            let db = Database::new(db_config).await?;
            info!("Database connection pool established");

            database::run_migrations(db.pool()).await?;
            info!("Database migrations applied");

            let store = Arc::new(PgStore::new(db.pool().clone()));
            (
                store.clone() as Arc<dyn CatalogStore>,
                store.clone() as Arc<dyn HistoryStore>,
                store as Arc<dyn ProfileStore>,
                Some(db),
            )
        }
        None => {
            warn!("DATABASE_URL not set; using the in-memory store (data is lost on exit)");
            let store = Arc::new(MemoryStore::new());
            (
                store.clone() as Arc<dyn CatalogStore>,
                store.clone() as Arc<dyn HistoryStore>,
                store as Arc<dyn ProfileStore>,
                None,
            )
        }
    };

    // Recommendation service
    let connector = Arc::new(SpotifyConnector::new(&config.streaming)?);
    let builder = PlaylistBuilder::with_settings(catalog, config.recommendation.build_settings());
    let service = RecommendationService::new(builder, history, profiles)
        .with_feedback_window(config.recommendation.feedback_window())
        .with_streaming(
            connector,
            PlaylistSynchronizer::new(config.streaming.playlist_name.clone()),
        );

    let state = Arc::new(AppState {
        controller: PlaylistController::new(Arc::new(service)),
        database: db.clone(),
    });

    // API server
    let server = {
        let config = config.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_server(state, &config.api, shutdown).await {
                error!("API server error: {:?}", e);
            }
        })
    };
    info!("API: http://{}:{}", config.api.host, config.api.port);
    info!("Health: http://{}:{}/health", config.api.host, config.api.port);

    // Wait for shutdown signal or server failure
    tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
        _ = wait_for_exit(&server) => {
            warn!("API server stopped, initiating shutdown");
        }
    }

    info!("Initiating graceful shutdown...");
    shutdown.cancel();

    let shutdown_timeout = Duration::from_secs(30);
    if tokio::time::timeout(shutdown_timeout, server).await.is_err() {
        warn!("Shutdown timeout exceeded, forcing exit");
    }

    if let Some(db) = db {
        db.close().await;
    }

    info!("Moodfade Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("moodfade_engine=debug,moodfade=debug,tower_http=debug,sqlx=warn,info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .init();
}

async fn wait_for_exit(handle: &tokio::task::JoinHandle<()>) {
    while !handle.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
