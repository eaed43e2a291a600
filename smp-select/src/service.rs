//! Next-track service
//!
//! Owns the database pool and the effective [`SelectionSettings`]. Each
//! request loads a fresh catalog and history snapshot, then runs the
//! synchronous [`Selector`] on the blocking pool.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use smp_common::config::SelectionOverrides;
use smp_common::db::init_database;
use smp_common::{time, Embedding, Error, HistoryEntry, Track, TrackId};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db;
use crate::error::{SelectionOutcome, StoreError};
use crate::query::{source_filename_from_path, SelectionQuery};
use crate::selector::{RankedTrack, SelectionReport, Selector};
use crate::settings::SelectionSettings;

/// How a caller names the reference track
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceInput {
    Id(TrackId),
    /// Catalog path; also supplies the title hint
    Path(String),
    Vector(Embedding),
}

/// Selection front end over a SQLite database
#[derive(Debug, Clone)]
pub struct NextTrackService {
    pool: SqlitePool,
    settings: SelectionSettings,
}

impl NextTrackService {
    /// Open (creating if needed) the database and load selection settings
    pub async fn open(db_path: &Path, overrides: &SelectionOverrides) -> smp_common::Result<Self> {
        let pool = init_database(db_path).await?;
        let mut settings = SelectionSettings::load(&pool).await?;
        settings.apply_overrides(overrides)?;

        info!(
            recency_window_secs = settings.recency_window_secs,
            near_duplicate_threshold = settings.near_duplicate_threshold,
            shortlist_size = settings.shortlist_size,
            title_match = settings.title_match.as_str(),
            "Selection settings loaded"
        );

        Ok(Self::from_pool(pool, settings))
    }

    pub fn from_pool(pool: SqlitePool, settings: SelectionSettings) -> Self {
        Self { pool, settings }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn settings(&self) -> &SelectionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut SelectionSettings {
        &mut self.settings
    }

    /// Build a query with the configured window and threshold
    ///
    /// A path reference is resolved to its catalog id and its file name
    /// becomes the source filename.
    pub async fn query_for(
        &self,
        reference: ReferenceInput,
    ) -> Result<SelectionQuery, SelectionOutcome> {
        let query = match reference {
            ReferenceInput::Id(id) => SelectionQuery::by_id(id),
            ReferenceInput::Vector(embedding) => SelectionQuery::by_vector(embedding),
            ReferenceInput::Path(path) => {
                let id = db::find_track_id_by_path(&self.pool, &path)
                    .await?
                    .ok_or_else(|| SelectionOutcome::ReferenceNotFound(path.clone()))?;
                SelectionQuery::by_id(id).with_source_filename(source_filename_from_path(&path))
            }
        };

        Ok(query
            .with_recency_window(self.settings.recency_window())
            .with_near_duplicate_threshold(self.settings.near_duplicate_threshold))
    }

    /// Best next track for `query`
    pub async fn select(&self, query: SelectionQuery) -> Result<RankedTrack, SelectionOutcome> {
        self.evaluate(query, time::now()).await?.into_best()
    }

    /// Up to the configured shortlist size of ranked tracks
    pub async fn shortlist(
        &self,
        query: SelectionQuery,
    ) -> Result<Vec<RankedTrack>, SelectionOutcome> {
        let limit = self.settings.shortlist_size;
        self.evaluate(query, time::now()).await?.into_shortlist(limit)
    }

    /// Run the full pipeline against fresh snapshots
    pub async fn evaluate(
        &self,
        query: SelectionQuery,
        now: DateTime<Utc>,
    ) -> Result<SelectionReport, SelectionOutcome> {
        let catalog = db::load_catalog(&self.pool).await?;
        let cutoff = time::window_start(now, query.recency_window);
        let history = db::load_history_since(&self.pool, cutoff).await?;

        debug!(
            tracks = catalog.len(),
            recent_plays = history.len(),
            "Snapshots loaded"
        );

        let title_match = self.settings.title_match;
        let task = tokio::task::spawn_blocking(move || {
            Selector::with_title_match(catalog, history, title_match).evaluate_at(&query, now)
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(SelectionOutcome::StoreUnavailable(format!(
                "selection task cancelled: {}",
                e
            ))),
        }
    }

    /// Append a play of `track` at `at`
    pub async fn record_play(&self, track: &Track, at: DateTime<Utc>) -> smp_common::Result<()> {
        db::record_play(&self.pool, &HistoryEntry::for_track(track, at)).await
    }

    /// Most recent play of `track`, if any
    pub async fn last_played(&self, track: &Track) -> Result<Option<DateTime<Utc>>, StoreError> {
        db::last_played_at(&self.pool, track).await
    }

    /// Insert or update catalog tracks in one transaction
    ///
    /// Every embedding in the batch, and in the catalog rows the batch does
    /// not replace, must share one dimension; otherwise nothing is written.
    pub async fn import_tracks(&self, tracks: &[Track]) -> smp_common::Result<usize> {
        let existing = db::load_catalog(&self.pool)
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let replaced: HashSet<&TrackId> = tracks.iter().map(|t| &t.id).collect();
        let kept = existing
            .tracks()
            .iter()
            .filter(|t| !replaced.contains(&t.id));

        let mut dimensions: BTreeMap<usize, usize> = BTreeMap::new();
        for embedding in kept.chain(tracks).filter_map(|t| t.embedding.as_ref()) {
            *dimensions.entry(embedding.len()).or_default() += 1;
        }
        if dimensions.len() > 1 {
            return Err(Error::InvalidInput(format!(
                "Inconsistent embedding dimensions (dimension: count): {:?}",
                dimensions
            )));
        }
        if dimensions.contains_key(&0) {
            return Err(Error::InvalidInput("Empty embedding in import".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        for track in tracks {
            db::save_track(&mut *tx, track).await?;
        }
        tx.commit().await?;

        info!("Imported {} tracks", tracks.len());
        Ok(tracks.len())
    }
}
