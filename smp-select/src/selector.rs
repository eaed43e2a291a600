//! Next-track selector
//!
//! One query runs collecting → scoring → filtering → ranking over a single
//! catalog enumeration. Scoring and filtering are independent per candidate
//! and run on the rayon pool; ranking is one deterministic sort (score
//! descending, id ascending).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use smp_common::{time, Track, TrackId};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::{SelectionOutcome, StoreError};
use crate::filters::{Candidate, FilterChain, FilterContext, RejectionStage, TitleMatch};
use crate::history::History;
use crate::query::{Reference, ResolvedReference, SelectionQuery};
use crate::scorer::{ReferenceVector, ScoreError};

/// Survivor with its similarity to the reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedTrack {
    pub track: Track,
    pub score: f64,
}

impl RankedTrack {
    /// Cosine distance to the reference
    pub fn distance(&self) -> f64 {
        1.0 - self.score
    }
}

/// Candidate removed from ranking, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub track_id: TrackId,
    pub stage: RejectionStage,
}

/// Full result of evaluating one query
#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    /// Survivors, best first
    pub ranked: Vec<RankedTrack>,
    pub rejected: Vec<Rejection>,
    /// Catalog size at collection time
    pub considered: usize,
}

impl SelectionReport {
    pub fn best(&self) -> Option<&RankedTrack> {
        self.ranked.first()
    }

    /// Rejection count per stage
    pub fn rejection_counts(&self) -> BTreeMap<RejectionStage, usize> {
        let mut counts = BTreeMap::new();
        for rejection in &self.rejected {
            *counts.entry(rejection.stage).or_insert(0) += 1;
        }
        counts
    }

    /// Best track, or `NoEligibleTrack` when nothing survived
    pub fn into_best(self) -> Result<RankedTrack, SelectionOutcome> {
        let considered = self.considered;
        let rejected = self.rejected.len();
        self.ranked
            .into_iter()
            .next()
            .ok_or(SelectionOutcome::NoEligibleTrack {
                considered,
                rejected,
            })
    }

    /// Top `limit` survivors; `NoEligibleTrack` when nothing survived
    pub fn into_shortlist(mut self, limit: usize) -> Result<Vec<RankedTrack>, SelectionOutcome> {
        if self.ranked.is_empty() {
            return Err(SelectionOutcome::NoEligibleTrack {
                considered: self.considered,
                rejected: self.rejected.len(),
            });
        }
        self.ranked.truncate(limit.max(1));
        Ok(self.ranked)
    }
}

enum Verdict<'a> {
    Survivor(Candidate<'a>),
    Rejected(&'a TrackId, RejectionStage),
}

/// Selection engine over a catalog and a play history
pub struct Selector<C, H> {
    catalog: C,
    history: H,
    chain: FilterChain,
}

impl<C: Catalog, H: History> Selector<C, H> {
    /// Selector with the standard filter chain (substring title matching)
    pub fn new(catalog: C, history: H) -> Self {
        Self {
            catalog,
            history,
            chain: FilterChain::default(),
        }
    }

    /// Selector with the standard chain and the given title strategy
    pub fn with_title_match(catalog: C, history: H, title_match: TitleMatch) -> Self {
        Self::new(catalog, history).with_filter_chain(FilterChain::standard(title_match))
    }

    pub fn with_filter_chain(mut self, chain: FilterChain) -> Self {
        self.chain = chain;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    /// Best next track, evaluated now
    pub fn select_next(&self, query: &SelectionQuery) -> Result<Track, SelectionOutcome> {
        self.select_next_at(query, time::now())
    }

    /// Best next track, with the recency window ending at `now`
    pub fn select_next_at(
        &self,
        query: &SelectionQuery,
        now: DateTime<Utc>,
    ) -> Result<Track, SelectionOutcome> {
        Ok(self.evaluate_at(query, now)?.into_best()?.track)
    }

    /// Top `limit` tracks, evaluated now
    pub fn shortlist(
        &self,
        query: &SelectionQuery,
        limit: usize,
    ) -> Result<Vec<RankedTrack>, SelectionOutcome> {
        self.shortlist_at(query, limit, time::now())
    }

    pub fn shortlist_at(
        &self,
        query: &SelectionQuery,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedTrack>, SelectionOutcome> {
        self.evaluate_at(query, now)?.into_shortlist(limit)
    }

    /// Run the full pipeline and keep diagnostics
    ///
    /// An empty survivor list is reported, not raised; use
    /// [`SelectionReport::into_best`] to turn it into `NoEligibleTrack`.
    pub fn evaluate_at(
        &self,
        query: &SelectionQuery,
        now: DateTime<Utc>,
    ) -> Result<SelectionReport, SelectionOutcome> {
        // Collecting
        let reference = self.resolve_reference(&query.reference)?;
        let candidates = self.catalog.all()?;
        let considered = candidates.len();

        let ctx = FilterContext {
            query,
            reference: &reference,
            history: &self.history,
            now,
        };

        // Scoring + filtering
        let verdicts = candidates
            .par_iter()
            .map(|track| self.judge(track, &ctx))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut survivors = Vec::new();
        let mut rejected = Vec::new();
        for verdict in verdicts {
            match verdict {
                Verdict::Survivor(candidate) => survivors.push(candidate),
                Verdict::Rejected(track_id, stage) => rejected.push(Rejection {
                    track_id: track_id.clone(),
                    stage,
                }),
            }
        }

        // Ranking
        survivors.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.track.id.cmp(&b.track.id))
        });
        rejected.sort_by(|a, b| a.track_id.cmp(&b.track_id));

        let report = SelectionReport {
            ranked: survivors
                .into_iter()
                .map(|c| RankedTrack {
                    track: c.track.clone(),
                    score: c.score,
                })
                .collect(),
            rejected,
            considered,
        };

        match report.best() {
            Some(best) => info!(
                considered,
                survivors = report.ranked.len(),
                rejections = ?report.rejection_counts(),
                track_id = %best.track.id,
                score = best.score,
                "Selected next track"
            ),
            None => info!(
                considered,
                rejections = ?report.rejection_counts(),
                "No eligible track"
            ),
        }

        Ok(report)
    }

    fn resolve_reference(
        &self,
        reference: &Reference,
    ) -> Result<ResolvedReference, SelectionOutcome> {
        match reference {
            Reference::ById(id) => {
                let track = self.catalog.get(id).map_err(|e| match e {
                    StoreError::NotFound(_) => {
                        SelectionOutcome::ReferenceNotFound(id.to_string())
                    }
                    StoreError::Unavailable(msg) => SelectionOutcome::StoreUnavailable(msg),
                })?;
                let embedding = track.embedding.as_deref().ok_or_else(|| {
                    SelectionOutcome::DegenerateVector(format!(
                        "reference track {} has no embedding",
                        id
                    ))
                })?;
                let vector = ReferenceVector::new(embedding).map_err(|e| {
                    SelectionOutcome::DegenerateVector(format!("reference track {}: {}", id, e))
                })?;
                Ok(ResolvedReference {
                    id: Some(track.id),
                    mbid: track.mbid,
                    path: Some(track.path),
                    vector,
                })
            }
            Reference::ByVector(embedding) => ReferenceVector::new(embedding)
                .map(ResolvedReference::from_vector)
                .map_err(|e| {
                    SelectionOutcome::DegenerateVector(format!("reference vector: {}", e))
                }),
        }
    }

    fn judge<'a>(
        &self,
        track: &'a Track,
        ctx: &FilterContext<'_>,
    ) -> Result<Verdict<'a>, StoreError> {
        let score = match ctx.reference.vector.score_optional(track.embedding.as_deref()) {
            Ok(score) => score,
            Err(err) => {
                match err {
                    ScoreError::MissingEmbedding => debug!(
                        track_id = %track.id,
                        path = %track.path,
                        "Skipping track without embedding"
                    ),
                    _ => warn!(
                        track_id = %track.id,
                        path = %track.path,
                        error = %err,
                        "Skipping unscoreable track"
                    ),
                }
                return Ok(Verdict::Rejected(&track.id, RejectionStage::Unscoreable));
            }
        };

        let candidate = Candidate { track, score };
        match self.chain.evaluate(&candidate, ctx)? {
            Some(stage) => {
                debug!(
                    track_id = %track.id,
                    path = %track.path,
                    %stage,
                    score,
                    "Rejected candidate"
                );
                Ok(Verdict::Rejected(&track.id, stage))
            }
            None => Ok(Verdict::Survivor(candidate)),
        }
    }
}
