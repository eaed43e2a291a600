//! Selection query input

use std::collections::HashSet;

use chrono::Duration;
use smp_common::db::models::file_name_of;
use smp_common::time::window_from_secs;
use smp_common::{Embedding, TrackId};

use crate::scorer::ReferenceVector;

/// Default recency window (2 hours)
pub const DEFAULT_RECENCY_WINDOW_SECS: u64 = 7200;

/// Cosine distance below which two tracks count as the same recording
pub const DEFAULT_NEAR_DUPLICATE_THRESHOLD: f64 = 0.001;

/// What the next track should be similar to
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// A catalog track, resolved to its stored embedding
    ById(TrackId),
    /// An explicit embedding
    ByVector(Embedding),
}

/// Input to one selection request
#[derive(Debug, Clone)]
pub struct SelectionQuery {
    pub reference: Reference,
    /// File the decision is made on behalf of (for the title heuristic)
    pub source_filename: Option<String>,
    /// Ids rejected regardless of other rules
    pub excluded_ids: HashSet<TrackId>,
    pub recency_window: Duration,
    pub near_duplicate_threshold: f64,
}

impl SelectionQuery {
    pub fn new(reference: Reference) -> Self {
        Self {
            reference,
            source_filename: None,
            excluded_ids: HashSet::new(),
            recency_window: window_from_secs(DEFAULT_RECENCY_WINDOW_SECS),
            near_duplicate_threshold: DEFAULT_NEAR_DUPLICATE_THRESHOLD,
        }
    }

    pub fn by_id(id: impl Into<TrackId>) -> Self {
        Self::new(Reference::ById(id.into()))
    }

    pub fn by_vector(embedding: Embedding) -> Self {
        Self::new(Reference::ByVector(embedding))
    }

    pub fn with_source_filename(mut self, filename: impl Into<String>) -> Self {
        self.source_filename = Some(filename.into());
        self
    }

    pub fn exclude(mut self, id: impl Into<TrackId>) -> Self {
        self.excluded_ids.insert(id.into());
        self
    }

    pub fn with_recency_window(mut self, window: Duration) -> Self {
        self.recency_window = window;
        self
    }

    pub fn with_near_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.near_duplicate_threshold = threshold;
        self
    }
}

/// Reference after the collecting phase: always a vector, plus the identity
/// of the reference track when there is one
#[derive(Debug, Clone)]
pub struct ResolvedReference {
    pub id: Option<TrackId>,
    pub mbid: Option<String>,
    pub path: Option<String>,
    pub vector: ReferenceVector,
}

impl ResolvedReference {
    /// Reference given as a bare vector (no identity to dedup against)
    pub fn from_vector(vector: ReferenceVector) -> Self {
        Self {
            id: None,
            mbid: None,
            path: None,
            vector,
        }
    }
}

/// Title hint taken from a file path: the file name without a trailing
/// `.mp3` extension (case-insensitive)
pub fn source_filename_from_path(path: &str) -> String {
    let name = file_name_of(path);
    let stem_len = name.len().saturating_sub(4);
    match name.get(stem_len..) {
        Some(ext) if name.len() > 4 && ext.eq_ignore_ascii_case(".mp3") => {
            name[..stem_len].to_string()
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let query = SelectionQuery::by_id("t1");
        assert_eq!(query.reference, Reference::ById(TrackId::from("t1")));
        assert_eq!(query.recency_window, Duration::hours(2));
        assert_eq!(query.near_duplicate_threshold, DEFAULT_NEAR_DUPLICATE_THRESHOLD);
        assert!(query.excluded_ids.is_empty());
        assert!(query.source_filename.is_none());
    }

    #[test]
    fn test_builder() {
        let query = SelectionQuery::by_vector(vec![1.0, 0.0])
            .with_source_filename("01 - Yesterday.mp3")
            .exclude("t2")
            .exclude("t3")
            .with_recency_window(Duration::minutes(30))
            .with_near_duplicate_threshold(0.05);

        assert_eq!(query.source_filename.as_deref(), Some("01 - Yesterday.mp3"));
        assert!(query.excluded_ids.contains(&TrackId::from("t3")));
        assert_eq!(query.excluded_ids.len(), 2);
        assert_eq!(query.recency_window, Duration::minutes(30));
        assert_eq!(query.near_duplicate_threshold, 0.05);
    }

    #[test]
    fn test_source_filename_from_path() {
        assert_eq!(
            source_filename_from_path("/music/Beatles/01 - Yesterday.MP3"),
            "01 - Yesterday"
        );
        assert_eq!(source_filename_from_path("/music/song.flac"), "song.flac");
        assert_eq!(source_filename_from_path(".mp3"), ".mp3");
        assert_eq!(source_filename_from_path("/music/Ünïcode.mp3"), "Ünïcode");
    }
}
