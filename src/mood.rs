//! Mood labels, listening modes and feedback labels
//!
//! The six mood labels form a closed set. Each has exactly one bridge mood,
//! used only in regulation mode to smooth the path from the current mood to
//! the target mood.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Emotional tone tag shared by catalog tracks, sessions and profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MoodLabel {
    #[serde(rename = "Positive & Uplifting")]
    PositiveUplifting,
    #[serde(rename = "Romantic & Sensual")]
    RomanticSensual,
    #[serde(rename = "Energetic & Intense")]
    EnergeticIntense,
    #[serde(rename = "Calm & Reflective")]
    CalmReflective,
    #[serde(rename = "Melancholic & Dark")]
    MelancholicDark,
    #[serde(rename = "Unconventional & Playful")]
    UnconventionalPlayful,
}

impl MoodLabel {
    pub const ALL: [MoodLabel; 6] = [
        MoodLabel::PositiveUplifting,
        MoodLabel::RomanticSensual,
        MoodLabel::EnergeticIntense,
        MoodLabel::CalmReflective,
        MoodLabel::MelancholicDark,
        MoodLabel::UnconventionalPlayful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MoodLabel::PositiveUplifting => "Positive & Uplifting",
            MoodLabel::RomanticSensual => "Romantic & Sensual",
            MoodLabel::EnergeticIntense => "Energetic & Intense",
            MoodLabel::CalmReflective => "Calm & Reflective",
            MoodLabel::MelancholicDark => "Melancholic & Dark",
            MoodLabel::UnconventionalPlayful => "Unconventional & Playful",
        }
    }

    /// Intermediate mood for regulation mode
    pub fn bridge(&self) -> MoodLabel {
        match self {
            MoodLabel::PositiveUplifting => MoodLabel::RomanticSensual,
            MoodLabel::RomanticSensual => MoodLabel::CalmReflective,
            MoodLabel::EnergeticIntense => MoodLabel::UnconventionalPlayful,
            MoodLabel::CalmReflective => MoodLabel::RomanticSensual,
            MoodLabel::MelancholicDark => MoodLabel::CalmReflective,
            MoodLabel::UnconventionalPlayful => MoodLabel::EnergeticIntense,
        }
    }

    /// Lenient parse for stored data: unknown labels become `None` and are logged.
    pub fn parse_lenient(raw: Option<&str>) -> Option<MoodLabel> {
        let raw = raw?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse() {
            Ok(mood) => Some(mood),
            Err(_) => {
                tracing::warn!("Ignoring unknown mood label '{}'", raw);
                None
            }
        }
    }
}

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MoodLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        MoodLabel::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidMood(s.to_string()))
    }
}

/// Listening mode chosen for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Stay in the current mood
    Current,
    /// Shift toward the target mood via the bridge mood
    Regulation,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Current => "current",
            Mode::Regulation => "regulation",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(Mode::Current),
            "regulation" => Ok(Mode::Regulation),
            other => Err(Error::bad_request(format!("Unknown mode '{}'", other))),
        }
    }
}

/// End-of-session rating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeedbackLabel {
    #[serde(rename = "Very Positive")]
    VeryPositive,
    #[serde(rename = "Positive")]
    Positive,
    #[serde(rename = "Neutral")]
    Neutral,
    #[serde(rename = "Negative")]
    Negative,
    #[serde(rename = "Very Negative")]
    VeryNegative,
}

/// Weights used by the feedback aggregator for per-mood sentiment.
pub const AGGREGATOR_WEIGHTS: FeedbackWeights = FeedbackWeights {
    very_positive: 2.0,
    positive: 1.0,
    neutral: 0.0,
    negative: -1.0,
    very_negative: -2.0,
};

/// Weights used by the trend scorer. Deliberately a different scale from
/// [`AGGREGATOR_WEIGHTS`]; the two are tested independently.
pub const TREND_WEIGHTS: FeedbackWeights = FeedbackWeights {
    very_positive: 3.0,
    positive: 2.0,
    neutral: 1.0,
    negative: -2.0,
    very_negative: -3.0,
};

/// A signed weight per feedback label
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackWeights {
    pub very_positive: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
    pub very_negative: f64,
}

impl FeedbackWeights {
    pub fn weight(&self, label: FeedbackLabel) -> f64 {
        match label {
            FeedbackLabel::VeryPositive => self.very_positive,
            FeedbackLabel::Positive => self.positive,
            FeedbackLabel::Neutral => self.neutral,
            FeedbackLabel::Negative => self.negative,
            FeedbackLabel::VeryNegative => self.very_negative,
        }
    }
}

impl FeedbackLabel {
    pub const ALL: [FeedbackLabel; 5] = [
        FeedbackLabel::VeryPositive,
        FeedbackLabel::Positive,
        FeedbackLabel::Neutral,
        FeedbackLabel::Negative,
        FeedbackLabel::VeryNegative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackLabel::VeryPositive => "Very Positive",
            FeedbackLabel::Positive => "Positive",
            FeedbackLabel::Neutral => "Neutral",
            FeedbackLabel::Negative => "Negative",
            FeedbackLabel::VeryNegative => "Very Negative",
        }
    }

    pub fn aggregator_weight(&self) -> f64 {
        AGGREGATOR_WEIGHTS.weight(*self)
    }

    pub fn trend_weight(&self) -> f64 {
        TREND_WEIGHTS.weight(*self)
    }

    /// Lenient parse for stored data
    pub fn parse_lenient(raw: Option<&str>) -> Option<FeedbackLabel> {
        let raw = raw?.trim();
        let found = FeedbackLabel::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(raw));
        if found.is_none() && !raw.is_empty() {
            tracing::warn!("Ignoring unknown feedback label '{}'", raw);
        }
        found
    }
}

impl fmt::Display for FeedbackLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_mood_has_a_distinct_bridge() {
        for mood in MoodLabel::ALL {
            assert_ne!(mood.bridge(), mood);
        }
        assert_eq!(MoodLabel::MelancholicDark.bridge(), MoodLabel::CalmReflective);
        assert_eq!(
            MoodLabel::EnergeticIntense.bridge(),
            MoodLabel::UnconventionalPlayful
        );
    }

    #[test]
    fn test_mood_parse_matches_display() {
        for mood in MoodLabel::ALL {
            assert_eq!(mood.as_str().parse::<MoodLabel>().unwrap(), mood);
        }
        assert_eq!(
            "calm & reflective".parse::<MoodLabel>().unwrap(),
            MoodLabel::CalmReflective
        );
        assert!("Sleepy".parse::<MoodLabel>().is_err());
        assert_eq!(MoodLabel::parse_lenient(Some("Sleepy")), None);
        assert_eq!(MoodLabel::parse_lenient(None), None);
    }

    #[test]
    fn test_mood_serde_uses_display_labels() {
        let json = serde_json::to_string(&MoodLabel::RomanticSensual).unwrap();
        assert_eq!(json, "\"Romantic & Sensual\"");
        let mode: Mode = serde_json::from_str("\"regulation\"").unwrap();
        assert_eq!(mode, Mode::Regulation);
        let fb: FeedbackLabel = serde_json::from_str("\"Very Negative\"").unwrap();
        assert_eq!(fb, FeedbackLabel::VeryNegative);
    }

    #[test]
    fn test_weight_scales_are_independent() {
        assert_eq!(FeedbackLabel::VeryPositive.aggregator_weight(), 2.0);
        assert_eq!(FeedbackLabel::Neutral.aggregator_weight(), 0.0);
        assert_eq!(FeedbackLabel::Negative.aggregator_weight(), -1.0);
        assert_eq!(FeedbackLabel::VeryPositive.trend_weight(), 3.0);
        assert_eq!(FeedbackLabel::Neutral.trend_weight(), 1.0);
        assert_eq!(FeedbackLabel::Negative.trend_weight(), -2.0);
        assert_eq!(FeedbackLabel::VeryNegative.trend_weight(), -3.0);
    }
}
