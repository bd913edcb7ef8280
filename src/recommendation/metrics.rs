//! Build metrics and performance timing
//!
//! One [`BuildMetrics`] is filled in per playlist build and logged as a
//! single summary line when the build finishes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

use crate::models::{Provenance, Track};

/// Counters for one playlist build
#[derive(Debug, Clone, Serialize)]
pub struct BuildMetrics {
    pub build_id: String,
    pub timestamp: i64,

    // Performance
    pub total_duration_ms: u64,
    pub pool_fetch_ms: u64,
    pub enrichment_ms: u64,
    pub favorites_ms: u64,

    // Pipeline counts
    pub pool_tracks: usize,
    pub enrichment_hits: usize,
    pub enrichment_failures: usize,
    pub favorite_artists_resolved: usize,
    pub favorite_tracks: usize,
    pub duplicates_dropped: usize,
    pub banned: usize,
    pub returned: usize,
    pub avg_score: f64,

    /// provenance tag -> count in the final playlist
    pub provenance_mix: BTreeMap<&'static str, usize>,
}

impl Default for BuildMetrics {
    fn default() -> Self {
        Self {
            build_id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            total_duration_ms: 0,
            pool_fetch_ms: 0,
            enrichment_ms: 0,
            favorites_ms: 0,
            pool_tracks: 0,
            enrichment_hits: 0,
            enrichment_failures: 0,
            favorite_artists_resolved: 0,
            favorite_tracks: 0,
            duplicates_dropped: 0,
            banned: 0,
            returned: 0,
            avg_score: 0.0,
            provenance_mix: BTreeMap::new(),
        }
    }
}

impl BuildMetrics {
    /// Fill the output-side fields from the final playlist
    pub fn record_output(&mut self, tracks: &[Track]) {
        self.returned = tracks.len();
        self.avg_score = if tracks.is_empty() {
            0.0
        } else {
            tracks.iter().map(|t| t.score).sum::<f64>() / tracks.len() as f64
        };
        self.provenance_mix.clear();
        for track in tracks {
            *self.provenance_mix.entry(track.provenance.tag()).or_insert(0) += 1;
        }
    }

    pub fn count(&self, provenance: Provenance) -> usize {
        self.provenance_mix
            .get(provenance.tag())
            .copied()
            .unwrap_or(0)
    }

    /// Share of enrichment lookups that returned a match
    pub fn enrichment_hit_rate(&self) -> f64 {
        let attempted = self.pool_tracks;
        if attempted == 0 {
            return 0.0;
        }
        self.enrichment_hits as f64 / attempted as f64
    }

    /// Conditions worth a warning in the build log
    pub fn detect_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.returned == 0 {
            issues.push("Empty playlist".to_string());
        }
        if self.total_duration_ms > 5_000 {
            issues.push(format!("Slow build: {}ms", self.total_duration_ms));
        }
        if self.pool_tracks > 0 && self.enrichment_failures * 2 > self.pool_tracks {
            issues.push(format!(
                "Enrichment mostly failing: {}/{} lookups",
                self.enrichment_failures, self.pool_tracks
            ));
        }
        if self.pool_tracks > 0 && self.banned * 2 > self.pool_tracks {
            issues.push(format!("Over half the pool banned: {}", self.banned));
        }

        issues
    }

    pub fn log_summary(&self) {
        tracing::info!(
            build_id = %self.build_id,
            duration_ms = self.total_duration_ms,
            pool = self.pool_tracks,
            favorites = self.favorite_tracks,
            duplicates = self.duplicates_dropped,
            banned = self.banned,
            returned = self.returned,
            avg_score = self.avg_score,
            "Playlist built: {:?}",
            self.provenance_mix
        );
        for issue in self.detect_issues() {
            tracing::warn!(build_id = %self.build_id, "Build issue: {}", issue);
        }
    }
}

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: String,
}

impl PerformanceTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.elapsed_ms();
        tracing::debug!("{} completed in {}ms", self.label, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::MoodLabel;

    #[test]
    fn test_record_output_counts_provenance() {
        let mut a = Track::catalog("1", "A", "X", Some(MoodLabel::CalmReflective));
        a.score = 1.0;
        let mut b = Track::catalog("2", "B", "Y", None)
            .with_provenance(Provenance::FavoriteArtist, None);
        b.score = 0.5;

        let mut metrics = BuildMetrics::default();
        metrics.record_output(&[a, b]);

        assert_eq!(metrics.returned, 2);
        assert_eq!(metrics.count(Provenance::CurrentPool), 1);
        assert_eq!(metrics.count(Provenance::FavoriteArtist), 1);
        assert_eq!(metrics.count(Provenance::BridgePool), 0);
        assert!((metrics.avg_score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_detect_issues() {
        let mut metrics = BuildMetrics::default();
        metrics.pool_tracks = 10;
        metrics.enrichment_failures = 8;
        metrics.banned = 6;
        metrics.total_duration_ms = 6_000;

        let issues = metrics.detect_issues();
        assert!(issues.iter().any(|i| i.contains("Empty playlist")));
        assert!(issues.iter().any(|i| i.contains("Slow build")));
        assert!(issues.iter().any(|i| i.contains("Enrichment mostly failing")));
        assert!(issues.iter().any(|i| i.contains("banned")));
    }

    #[test]
    fn test_enrichment_hit_rate() {
        let mut metrics = BuildMetrics::default();
        assert_eq!(metrics.enrichment_hit_rate(), 0.0);
        metrics.pool_tracks = 4;
        metrics.enrichment_hits = 3;
        assert!((metrics.enrichment_hit_rate() - 0.75).abs() < 1e-9);
    }
}
