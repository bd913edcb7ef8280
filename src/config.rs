//! Configuration management for the Moodfade engine
//!
//! Strongly-typed configuration loaded from the environment, with defaults
//! that run the service locally against the in-memory store.
//!
//! # Example
//! ```no_run
//! use moodfade::Config;
//! let config = Config::from_env().expect("failed to load config");
//! println!("Playlist name: {}", config.streaming.playlist_name);
//! ```

use crate::error::{Error, Result};
use crate::recommendation::engine::BuildSettings;
use std::time::Duration;
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres; `None` runs on the in-memory store
    pub database: Option<DatabaseConfig>,
    /// API server configuration
    pub api: ApiConfig,
    /// Streaming-service client configuration
    pub streaming: StreamingConfig,
    /// Playlist build configuration
    pub recommendation: RecommendationConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Minimum connections to keep open
    pub min_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Idle timeout for connections
    pub idle_timeout: Duration,
    /// Maximum lifetime for connections
    pub max_lifetime: Duration,
    /// Enable statement caching
    pub statement_cache_size: usize,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to
    pub host: String,
    /// Request timeout
    pub request_timeout: Duration,
    /// Maximum request body size
    pub max_body_size: usize,
    /// Enable CORS
    pub cors_enabled: bool,
    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

/// Streaming-service configuration
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Web API base URL, without trailing slash
    pub api_base_url: String,
    /// Market for artist top tracks
    pub market: String,
    /// Name of the synced playlist
    pub playlist_name: String,
    /// Per-request timeout
    pub timeout: Duration,
}

/// Playlist build configuration
#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// History window fed to the feedback aggregator; 0 reads all history
    pub feedback_window_days: i64,
    /// Concurrent enrichment lookups per build
    pub max_concurrent_lookups: usize,
    /// Final playlist length cap
    pub playlist_limit: usize,
    /// Fixed RNG seed (tests, demos)
    pub random_seed: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.spotify.com".to_string(),
            market: "PL".to_string(),
            playlist_name: crate::streaming::sync::DEFAULT_PLAYLIST_NAME.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        let defaults = BuildSettings::default();
        Self {
            feedback_window_days: 30,
            max_concurrent_lookups: defaults.max_concurrent_lookups,
            playlist_limit: defaults.max_playlist_len,
            random_seed: None,
        }
    }
}

impl RecommendationConfig {
    /// Builder settings with the configured overrides applied
    pub fn build_settings(&self) -> BuildSettings {
        BuildSettings {
            max_concurrent_lookups: self.max_concurrent_lookups,
            max_playlist_len: self.playlist_limit,
            seed: self.random_seed,
            ..BuildSettings::default()
        }
    }

    /// `None` when the whole history should be read
    pub fn feedback_window(&self) -> Option<chrono::Duration> {
        (self.feedback_window_days > 0).then(|| chrono::Duration::days(self.feedback_window_days))
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Prefer loading env from a directory of files (FFOLDER) for platforms that mount secrets as files.
        // Each file name is the env var name and its contents is the value.
        if let Ok(folder) = std::env::var("FFOLDER") {
            load_env_folder(&folder);
        } else {
            // Try to load .env file (ignore if not found)
            dotenvy::dotenv().ok();
        }

        let config = Self {
            database: DatabaseConfig::from_env()?,
            api: ApiConfig::from_env()?,
            streaming: StreamingConfig::from_env()?,
            recommendation: RecommendationConfig::from_env()?,
        };

        config.validate()?;
        config.log_summary();

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(db) = &self.database {
            if db.max_connections < db.min_connections {
                return Err(Error::InvalidConfig {
                    key: "DB_MAX_CONNECTIONS",
                    message: "max_connections must be >= min_connections".into(),
                });
            }
        }

        if !self.streaming.api_base_url.starts_with("http://")
            && !self.streaming.api_base_url.starts_with("https://")
        {
            return Err(Error::InvalidConfig {
                key: "STREAMING_API_BASE_URL",
                message: format!("Not an http(s) URL: {}", self.streaming.api_base_url).into(),
            });
        }

        if self.streaming.playlist_name.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "STREAMING_PLAYLIST_NAME",
                message: "Playlist name cannot be empty".into(),
            });
        }

        if self.recommendation.playlist_limit == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_PLAYLIST_LIMIT",
                message: "Playlist limit must be at least 1".into(),
            });
        }

        if self.recommendation.max_concurrent_lookups == 0 {
            return Err(Error::InvalidConfig {
                key: "REC_MAX_CONCURRENT_LOOKUPS",
                message: "At least one concurrent lookup is required".into(),
            });
        }

        if self.recommendation.feedback_window_days < 0 {
            return Err(Error::InvalidConfig {
                key: "REC_FEEDBACK_WINDOW_DAYS",
                message: "Window cannot be negative".into(),
            });
        }

        Ok(())
    }

    /// Log configuration summary (without sensitive data)
    fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  Database:");
        match &self.database {
            Some(db) => {
                info!("    URL: {}", mask_url(&db.url));
                info!("    Pool Size: {}-{}", db.min_connections, db.max_connections);
            }
            None => info!("    In-memory store (DATABASE_URL not set)"),
        }
        info!("  API:");
        info!("    Listening on: {}:{}", self.api.host, self.api.port);
        info!("  Streaming:");
        info!("    Base URL: {}", self.streaming.api_base_url);
        info!("    Market: {}", self.streaming.market);
        info!("    Playlist: {}", self.streaming.playlist_name);
        info!("  Recommendation:");
        info!(
            "    Feedback window: {} days",
            self.recommendation.feedback_window_days
        );
        info!("    Playlist limit: {}", self.recommendation.playlist_limit);
    }
}

fn load_env_folder(folder: &str) {
    let p = std::path::Path::new(folder);
    if !p.is_dir() {
        return;
    }
    match std::fs::read_dir(p) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let fpath = entry.path();
                let Ok(fname) = entry.file_name().into_string() else {
                    continue;
                };
                if !fpath.is_file() {
                    continue;
                }
                if let Ok(contents) = std::fs::read_to_string(&fpath) {
                    // Only set env var if not already set in the environment
                    if std::env::var(&fname).is_err() {
                        std::env::set_var(&fname, contents.trim());
                    }
                }
            }
        }
        Err(err) => {
            log::warn!("Failed to read FFOLDER {}: {}", folder, err);
        }
    }
    log::info!("Loaded configuration from FFOLDER={}", folder);
}

impl DatabaseConfig {
    fn from_env() -> Result<Option<Self>> {
        let Ok(url) = get_env("DATABASE_URL") else {
            return Ok(None);
        };

        Ok(Some(Self {
            url,
            max_connections: get_env_or("DB_MAX_CONNECTIONS", "20").parse().unwrap_or(20),
            min_connections: get_env_or("DB_MIN_CONNECTIONS", "2").parse().unwrap_or(2),
            connect_timeout: Duration::from_secs(
                get_env_or("DB_CONNECT_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            idle_timeout: Duration::from_secs(
                get_env_or("DB_IDLE_TIMEOUT_SECS", "600")
                    .parse()
                    .unwrap_or(600),
            ),
            max_lifetime: Duration::from_secs(
                get_env_or("DB_MAX_LIFETIME_SECS", "3600")
                    .parse()
                    .unwrap_or(3600),
            ),
            statement_cache_size: get_env_or("DB_STATEMENT_CACHE_SIZE", "100")
                .parse()
                .unwrap_or(100),
        }))
    }
}

impl ApiConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            port: get_env_or("API_PORT", "8080").parse().unwrap_or(defaults.port),
            host: get_env_or("API_HOST", &defaults.host),
            request_timeout: Duration::from_secs(
                get_env_or("API_REQUEST_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
            max_body_size: get_env_or("API_MAX_BODY_SIZE", "1048576")
                .parse()
                .unwrap_or(defaults.max_body_size),
            cors_enabled: get_env_or("API_CORS_ENABLED", "true")
                .parse()
                .unwrap_or(true),
            cors_origins: get_env_or("API_CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }
}

impl StreamingConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_base_url: get_env_or("STREAMING_API_BASE_URL", &defaults.api_base_url)
                .trim_end_matches('/')
                .to_string(),
            market: get_env_or("STREAMING_MARKET", &defaults.market),
            playlist_name: get_env_or("STREAMING_PLAYLIST_NAME", &defaults.playlist_name),
            timeout: Duration::from_secs(
                get_env_or("STREAMING_TIMEOUT_SECS", "10")
                    .parse()
                    .unwrap_or(10),
            ),
        })
    }
}

impl RecommendationConfig {
    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let random_seed = match std::env::var("REC_RANDOM_SEED") {
            Ok(_) => Some(get_env_parsed("REC_RANDOM_SEED")?),
            Err(_) => None,
        };
        Ok(Self {
            feedback_window_days: get_env_or("REC_FEEDBACK_WINDOW_DAYS", "30")
                .parse()
                .unwrap_or(defaults.feedback_window_days),
            max_concurrent_lookups: get_env_or("REC_MAX_CONCURRENT_LOOKUPS", "8")
                .parse()
                .unwrap_or(defaults.max_concurrent_lookups),
            playlist_limit: get_env_or("REC_PLAYLIST_LIMIT", "45")
                .parse()
                .unwrap_or(defaults.playlist_limit),
            random_seed,
        })
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Get required environment variable
fn get_env(key: &'static str) -> Result<String> {
    std::env::var(key).map_err(|_| Error::MissingEnvVar { var: key })
}

/// Get environment variable with default
fn get_env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get and parse environment variable
fn get_env_parsed<T: std::str::FromStr>(key: &'static str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let value = get_env(key)?;
    value.parse().map_err(|e: T::Err| Error::InvalidConfig {
        key,
        message: format!("Invalid value '{}': {}", value, e).into(),
    })
}

/// Mask sensitive parts of URL
fn mask_url(url: &str) -> String {
    // Mask password if present
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let (before, after) = url.split_at(colon_pos + 1);
            let (_, rest) = after.split_at(at_pos - colon_pos - 1);
            return format!("{}****{}", before, rest);
        }
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database: None,
            api: ApiConfig::default(),
            streaming: StreamingConfig::default(),
            recommendation: RecommendationConfig::default(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(config().validate().is_ok());
        let settings = config().recommendation.build_settings();
        assert_eq!(settings.max_playlist_len, 45);
        assert_eq!(settings.current_quota, 30);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut c = config();
        c.recommendation.playlist_limit = 0;
        assert!(matches!(
            c.validate(),
            Err(Error::InvalidConfig { key: "REC_PLAYLIST_LIMIT", .. })
        ));

        let mut c = config();
        c.streaming.api_base_url = "api.spotify.com".to_string();
        assert!(c.validate().is_err());

        let mut c = config();
        c.database = Some(DatabaseConfig {
            url: "postgres://localhost/moodfade".to_string(),
            max_connections: 1,
            min_connections: 5,
            connect_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(1),
            max_lifetime: Duration::from_secs(1),
            statement_cache_size: 1,
        });
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_feedback_window() {
        let mut rec = RecommendationConfig::default();
        assert_eq!(rec.feedback_window(), Some(chrono::Duration::days(30)));
        rec.feedback_window_days = 0;
        assert_eq!(rec.feedback_window(), None);
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("postgres://moodfade:secret@db:5432/moodfade"),
            "postgres://moodfade:****@db:5432/moodfade"
        );
        assert_eq!(mask_url("postgres://localhost/db"), "postgres://localhost/db");
    }
}
