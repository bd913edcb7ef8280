//! Target-mood progress
//!
//! Converts a sparse history of regulation attempts into a single 0-100
//! progress signal: an exponential moving average over the most recent
//! rated attempts, rescaled and damped by a confidence factor that grows
//! with the number of attempts.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SessionRecord;
use crate::mood::{Mode, MoodLabel, TREND_WEIGHTS};

/// Most recent attempts that feed the average
pub const MAX_ATTEMPTS: usize = 12;
/// Attempts needed for full confidence
pub const FULL_CONFIDENCE_ATTEMPTS: usize = 6;

/// Detailed result behind the progress number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub target_mood: MoodLabel,
    /// Attempts used (at most [`MAX_ATTEMPTS`])
    pub attempts: usize,
    pub ema: f64,
    pub confidence: f64,
    pub progress: u8,
}

/// Progress toward the target mood, or `None` when there is no target or
/// no qualifying attempt.
pub fn score(
    sessions: &[SessionRecord],
    target_mood: Option<MoodLabel>,
    target_mood_changed_at: Option<DateTime<Utc>>,
) -> Option<u8> {
    evaluate(sessions, target_mood, target_mood_changed_at).map(|r| r.progress)
}

/// Same as [`score`] but keeps the intermediate values.
pub fn evaluate(
    sessions: &[SessionRecord],
    target_mood: Option<MoodLabel>,
    target_mood_changed_at: Option<DateTime<Utc>>,
) -> Option<TrendReport> {
    let target = target_mood?;

    let mut attempts: Vec<&SessionRecord> = sessions
        .iter()
        .filter(|s| is_attempt(s, target, target_mood_changed_at))
        .collect();
    if attempts.is_empty() {
        return None;
    }

    // Stable sort keeps caller order for equal timestamps
    attempts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    attempts.truncate(MAX_ATTEMPTS);

    let weights: Vec<f64> = attempts
        .iter()
        .filter_map(|s| s.feedback)
        .map(|f| TREND_WEIGHTS.weight(f))
        .collect();

    let ema = exponential_moving_average(&weights)?;
    let normalized = ((ema + 3.0) / 6.0 * 100.0).round();
    let confidence = (weights.len() as f64 / FULL_CONFIDENCE_ATTEMPTS as f64).min(1.0);
    let progress = (normalized * confidence).round().clamp(0.0, 100.0) as u8;

    Some(TrendReport {
        target_mood: target,
        attempts: weights.len(),
        ema,
        confidence,
        progress,
    })
}

/// A rated session at or after the fence that either regulated toward some
/// target or stayed in the target mood.
fn is_attempt(session: &SessionRecord, target: MoodLabel, fence: Option<DateTime<Utc>>) -> bool {
    if session.feedback.is_none() {
        return false;
    }
    if let Some(fence) = fence {
        if session.created_at < fence {
            return false;
        }
    }
    match session.mode {
        Some(Mode::Regulation) => true,
        Some(Mode::Current) => session.mood == Some(target),
        None => false,
    }
}

/// EMA over `values` in slice order, seeded with the first element,
/// `alpha = 2 / (n + 1)`.
fn exponential_moving_average(values: &[f64]) -> Option<f64> {
    let (first, rest) = values.split_first()?;
    let alpha = 2.0 / (values.len() as f64 + 1.0);
    Some(
        rest.iter()
            .fold(*first, |ema, v| alpha * v + (1.0 - alpha) * ema),
    )
}
