//! Recommendation Module
//!
//! Mood-based playlists that learn from listening sessions.
//!
//! ## Architecture
//!
//! 1. **Feedback** - Fold session history into per-track like/dislike counts and per-mood sentiment
//! 2. **Engine** - Draw mood pools, enrich, merge favorite-artist tracks, score and rank
//! 3. **Trend** - Damped progress toward the user's target mood
//! 4. **Session** - End-of-session review that becomes the next history record
//! 5. **Service / Controller** - Store wiring and per-user cancellation of superseded builds
//!
//! ## Modes
//!
//! - **Current**: every track comes from the current mood's pool
//! - **Regulation**: current, bridge and target pools in a fixed ratio, steering toward the target mood

pub mod controller;
pub mod engine;
pub mod feedback;
pub mod keys;
pub mod metrics;
pub mod service;
pub mod session;
pub mod trend;

pub use controller::{BuildState, PlaylistController};
pub use engine::{BuildRequest, BuildSettings, PlaylistBuilder};
pub use feedback::{aggregate, FeedbackTally, MoodAttribution};
pub use keys::TrackKey;
pub use service::{RecommendationService, Selection};
pub use session::SessionDraft;
pub use trend::TrendReport;
