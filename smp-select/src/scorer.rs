//! Similarity scoring
//!
//! Cosine similarity between a reference embedding and a candidate embedding.
//! Accumulation is done in f64; stored embeddings are f32.

use thiserror::Error;

/// Per-candidate scoring failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreError {
    #[error("embedding is missing")]
    MissingEmbedding,

    #[error("embedding is empty")]
    EmptyVector,

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding has zero or non-finite norm")]
    DegenerateVector,
}

/// Cosine similarity in [-1, 1]
///
/// Both vectors must be non-empty, of equal length, and have a finite
/// non-zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, ScoreError> {
    ReferenceVector::new(a)?.score(b)
}

/// Cosine distance (`1 - similarity`), in [0, 2]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> Result<f64, ScoreError> {
    Ok(1.0 - cosine_similarity(a, b)?)
}

/// Reference embedding with its norm computed once per query
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVector {
    values: Vec<f32>,
    norm: f64,
}

impl ReferenceVector {
    pub fn new(values: &[f32]) -> Result<Self, ScoreError> {
        if values.is_empty() {
            return Err(ScoreError::EmptyVector);
        }
        let norm = norm(values);
        if !is_usable_norm(norm) {
            return Err(ScoreError::DegenerateVector);
        }
        Ok(Self {
            values: values.to_vec(),
            norm,
        })
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Similarity of `candidate` to this reference
    pub fn score(&self, candidate: &[f32]) -> Result<f64, ScoreError> {
        if candidate.is_empty() {
            return Err(ScoreError::EmptyVector);
        }
        if candidate.len() != self.values.len() {
            return Err(ScoreError::DimensionMismatch {
                expected: self.values.len(),
                actual: candidate.len(),
            });
        }

        let candidate_norm = norm(candidate);
        if !is_usable_norm(candidate_norm) {
            return Err(ScoreError::DegenerateVector);
        }

        let dot: f64 = self
            .values
            .iter()
            .zip(candidate)
            .map(|(&a, &b)| f64::from(a) * f64::from(b))
            .sum();

        // Rounding can push |cos| a hair past 1.0
        Ok((dot / (self.norm * candidate_norm)).clamp(-1.0, 1.0))
    }

    /// Candidate scoring that also handles an absent embedding
    pub fn score_optional(&self, candidate: Option<&[f32]>) -> Result<f64, ScoreError> {
        match candidate {
            Some(values) => self.score(values),
            None => Err(ScoreError::MissingEmbedding),
        }
    }
}

fn norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|&v| f64::from(v) * f64::from(v))
        .sum::<f64>()
        .sqrt()
}

fn is_usable_norm(norm: f64) -> bool {
    norm.is_finite() && norm > 0.0
}
