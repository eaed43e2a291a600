//! Database models
//!
//! Catalog entries are produced upstream (tag extraction, metadata lookup and
//! embedding generation) and are read-only to the selection engine.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fixed-length acoustic style vector
pub type Embedding = Vec<f32>;

/// Stable catalog identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    /// Absolute path to the audio file
    pub path: String,
    /// MusicBrainz recording id; absent for unmatched tracks
    #[serde(default)]
    pub mbid: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub embedding: Option<Embedding>,
}

impl Track {
    /// Create a bare catalog entry with no metadata or embedding
    pub fn new(id: impl Into<TrackId>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            mbid: None,
            title: None,
            album: None,
            genre: None,
            year: None,
            album_type: None,
            embedding: None,
        }
    }

    pub fn with_mbid(mut self, mbid: impl Into<String>) -> Self {
        self.mbid = Some(mbid.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Embedding) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// MusicBrainz id, treating an empty string as absent
    pub fn mbid(&self) -> Option<&str> {
        self.mbid.as_deref().filter(|m| !m.trim().is_empty())
    }

    /// Title, treating an empty string as absent
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.is_empty())
    }

    /// Final path component (accepts both separators)
    pub fn file_name(&self) -> &str {
        file_name_of(&self.path)
    }
}

/// Final component of a slash- or backslash-separated path
pub fn file_name_of(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Past playback record (append-only)
///
/// `track_id` is absent for plays recorded by path only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub guid: Uuid,
    pub track_id: Option<TrackId>,
    pub path: Option<String>,
    pub played_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Play of a catalog track (records both id and path)
    pub fn for_track(track: &Track, played_at: DateTime<Utc>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            track_id: Some(track.id.clone()),
            path: Some(track.path.clone()),
            played_at,
        }
    }

    /// Play known only by file path
    pub fn for_path(path: impl Into<String>, played_at: DateTime<Utc>) -> Self {
        Self {
            guid: Uuid::new_v4(),
            track_id: None,
            path: Some(path.into()),
            played_at,
        }
    }
}

/// Encode an embedding as the JSON array stored in `tracks.embedding`
pub fn encode_embedding(embedding: &[f32]) -> Result<String> {
    serde_json::to_string(embedding)
        .map_err(|e| Error::InvalidInput(format!("Failed to encode embedding: {}", e)))
}

/// Decode a stored JSON embedding
pub fn decode_embedding(json: &str) -> Result<Embedding> {
    serde_json::from_str(json)
        .map_err(|e| Error::InvalidInput(format!("Malformed embedding JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_mbid_is_absent() {
        let track = Track::new("t1", "/music/a.mp3").with_mbid("  ");
        assert_eq!(track.mbid(), None);

        let track = Track::new("t1", "/music/a.mp3").with_mbid("0f3c-11");
        assert_eq!(track.mbid(), Some("0f3c-11"));
    }

    #[test]
    fn test_empty_title_is_absent() {
        let track = Track::new("t1", "/music/a.mp3").with_title("");
        assert_eq!(track.title(), None);
    }

    #[test]
    fn test_file_name() {
        let track = Track::new("t1", "/music/Beatles/01 - Yesterday.mp3");
        assert_eq!(track.file_name(), "01 - Yesterday.mp3");
        assert_eq!(file_name_of("C:\\Music\\song.mp3"), "song.mp3");
        assert_eq!(file_name_of("bare.mp3"), "bare.mp3");
    }

    #[test]
    fn test_track_ids_order_lexically() {
        let mut ids = vec![TrackId::from("b"), TrackId::from("a"), TrackId::from("c")];
        ids.sort();
        assert_eq!(ids, vec![TrackId::from("a"), TrackId::from("b"), TrackId::from("c")]);
    }

    #[test]
    fn test_track_deserializes_with_missing_fields() {
        let track: Track =
            serde_json::from_str(r#"{"id": "t9", "path": "/m/x.mp3", "title": "X"}"#).unwrap();
        assert_eq!(track.id, TrackId::from("t9"));
        assert_eq!(track.title(), Some("X"));
        assert!(track.embedding.is_none());
        assert!(track.mbid.is_none());
    }

    #[test]
    fn test_decode_embedding_rejects_malformed_json() {
        assert_eq!(decode_embedding("[0.5, -1.0]").unwrap(), vec![0.5, -1.0]);
        assert!(matches!(
            decode_embedding("[0.5, "),
            Err(Error::InvalidInput(_))
        ));
    }
}
