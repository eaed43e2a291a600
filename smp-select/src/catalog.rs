//! Catalog accessor
//!
//! Read-only view over the track catalog. The selector enumerates the whole
//! catalog once per query, so implementations should hand out a consistent
//! point-in-time view.

use std::collections::HashMap;

use smp_common::{Track, TrackId};
use tracing::warn;

use crate::error::StoreError;

/// Read-only track catalog
pub trait Catalog: Send + Sync {
    /// Look up a track by id
    fn get(&self, id: &TrackId) -> Result<Track, StoreError>;

    /// Enumerate every track (order not guaranteed)
    fn all(&self) -> Result<Vec<Track>, StoreError>;
}

/// In-memory point-in-time copy of the catalog
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    tracks: Vec<Track>,
    by_id: HashMap<TrackId, usize>,
}

impl CatalogSnapshot {
    /// Build a snapshot; a repeated id keeps the last entry
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let mut snapshot = Self::default();
        for track in tracks {
            match snapshot.by_id.get(&track.id) {
                Some(&index) => {
                    warn!(track_id = %track.id, "Duplicate catalog id, keeping last entry");
                    snapshot.tracks[index] = track;
                }
                None => {
                    snapshot.by_id.insert(track.id.clone(), snapshot.tracks.len());
                    snapshot.tracks.push(track);
                }
            }
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Track stored at exactly `path`
    pub fn find_by_path(&self, path: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.path == path)
    }

    /// Embedding dimensions present in the catalog with their counts
    ///
    /// More than one entry means the catalog violates the shared-dimension
    /// invariant; the selector rejects the odd ones out per candidate.
    pub fn embedding_dimensions(&self) -> HashMap<usize, usize> {
        let mut dims = HashMap::new();
        for embedding in self.tracks.iter().filter_map(|t| t.embedding.as_ref()) {
            *dims.entry(embedding.len()).or_insert(0) += 1;
        }
        dims
    }
}

impl Catalog for CatalogSnapshot {
    fn get(&self, id: &TrackId) -> Result<Track, StoreError> {
        self.by_id
            .get(id)
            .map(|&index| self.tracks[index].clone())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn all(&self) -> Result<Vec<Track>, StoreError> {
        Ok(self.tracks.clone())
    }
}
