//! Error and outcome types for the selection engine
//!
//! Every selection request ends in a track or in exactly one
//! [`SelectionOutcome`]. Per-candidate data problems never surface here on
//! their own; they are counted as rejections.

use smp_common::TrackId;
use thiserror::Error;

/// Non-track result of a selection request
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectionOutcome {
    /// Every candidate was rejected (or the catalog was empty).
    ///
    /// A normal outcome; the caller decides whether to relax the query.
    #[error("No eligible track ({rejected} of {considered} candidates rejected)")]
    NoEligibleTrack { considered: usize, rejected: usize },

    /// The reference id or path does not resolve to a catalog entry
    #[error("Reference track not found: {0}")]
    ReferenceNotFound(String),

    /// Catalog or history could not be read
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The reference embedding cannot be scored against (empty, zero-norm,
    /// non-finite, or missing)
    #[error("Degenerate reference vector: {0}")]
    DegenerateVector(String),
}

impl SelectionOutcome {
    /// True for the empty-result outcome, which needs no recovery
    pub fn is_no_eligible_track(&self) -> bool {
        matches!(self, SelectionOutcome::NoEligibleTrack { .. })
    }
}

/// Failure reported by a catalog or history accessor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Track not found: {0}")]
    NotFound(TrackId),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<smp_common::Error> for StoreError {
    fn from(err: smp_common::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Accessor failures during selection: the only `get` the selector performs
/// is for the reference, so `NotFound` always means the reference is unknown.
impl From<StoreError> for SelectionOutcome {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SelectionOutcome::ReferenceNotFound(id.to_string()),
            StoreError::Unavailable(msg) => SelectionOutcome::StoreUnavailable(msg),
        }
    }
}
