//! Composite track keys for feedback correlation
//!
//! Feedback records do not carry catalog ids, so likes and dislikes are
//! matched to tracks through `title__author`. This is the only place the key
//! is derived; both the session draft (write side) and the aggregator and
//! scorer (read side) go through it.

use crate::models::Track;
use serde::{Deserialize, Serialize};
use std::fmt;

const SEPARATOR: &str = "__";
const NO_IMAGE: &str = "noimg";

/// `title__author` correlation key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackKey(String);

impl TrackKey {
    pub fn new(title: &str, author: &str) -> Self {
        Self(format!("{}{}{}", title, SEPARATOR, author))
    }

    pub fn for_track(track: &Track) -> Self {
        Self::new(&track.title, &track.author)
    }

    /// Read a key as stored in a session record.
    ///
    /// Older records append an image discriminator (`__noimg` or `__<url>`);
    /// it is dropped so the stored key equals the derived one.
    pub fn from_stored(raw: &str) -> Self {
        if let Some((head, tail)) = raw.rsplit_once(SEPARATOR) {
            if head.contains(SEPARATOR) && (tail == NO_IMAGE || tail.contains("://")) {
                return Self(head.to_string());
            }
        }
        Self(raw.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
