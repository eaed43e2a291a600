//! Exclusion filter chain
//!
//! Each filter is a pure predicate over a scored candidate and the query
//! context. The standard chain runs cheapest-first and stops at the first
//! rejection, so every rejected candidate is attributed to exactly one stage.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use smp_common::Track;

use crate::error::StoreError;
use crate::history::{History, TrackRef};
use crate::query::{ResolvedReference, SelectionQuery};

/// Why a candidate was removed from ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionStage {
    /// Missing, empty, zero-norm or wrong-dimension embedding
    Unscoreable,
    ExplicitExclusion,
    SameIdentity,
    SamePath,
    NearDuplicate,
    RecentlyPlayed,
    TitleInFilename,
}

impl RejectionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionStage::Unscoreable => "unscoreable",
            RejectionStage::ExplicitExclusion => "explicit_exclusion",
            RejectionStage::SameIdentity => "same_identity",
            RejectionStage::SamePath => "same_path",
            RejectionStage::NearDuplicate => "near_duplicate",
            RejectionStage::RecentlyPlayed => "recently_played",
            RejectionStage::TitleInFilename => "title_in_filename",
        }
    }
}

impl fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate that survived scoring
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub track: &'a Track,
    /// Cosine similarity to the reference
    pub score: f64,
}

impl Candidate<'_> {
    /// Cosine distance to the reference
    pub fn distance(&self) -> f64 {
        1.0 - self.score
    }
}

/// Per-query context shared by all filters
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub query: &'a SelectionQuery,
    pub reference: &'a ResolvedReference,
    pub history: &'a dyn History,
    /// Evaluation time for the recency window
    pub now: DateTime<Utc>,
}

/// One stage of the chain
pub trait ExclusionFilter: Send + Sync {
    fn stage(&self) -> RejectionStage;

    /// True when the candidate must be dropped
    ///
    /// Errors are accessor failures and abort the whole query.
    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError>;
}

/// Candidate id listed in the query's `excluded_ids`
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitExclusion;

impl ExclusionFilter for ExplicitExclusion {
    fn stage(&self) -> RejectionStage {
        RejectionStage::ExplicitExclusion
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        Ok(ctx.query.excluded_ids.contains(&candidate.track.id))
    }
}

/// Candidate shares the reference track's MusicBrainz id (both non-empty)
#[derive(Debug, Clone, Copy, Default)]
pub struct SameIdentity;

impl ExclusionFilter for SameIdentity {
    fn stage(&self) -> RejectionStage {
        RejectionStage::SameIdentity
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        let reference_mbid = ctx
            .reference
            .mbid
            .as_deref()
            .filter(|m| !m.trim().is_empty());
        Ok(match (reference_mbid, candidate.track.mbid()) {
            (Some(reference), Some(mbid)) => reference == mbid,
            _ => false,
        })
    }
}

/// Candidate lives at the reference track's path
#[derive(Debug, Clone, Copy, Default)]
pub struct SamePath;

impl ExclusionFilter for SamePath {
    fn stage(&self) -> RejectionStage {
        RejectionStage::SamePath
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        Ok(ctx
            .reference
            .path
            .as_deref()
            .is_some_and(|path| path == candidate.track.path))
    }
}

/// Candidate is acoustically indistinguishable from the reference
/// (cosine distance strictly below the query threshold)
#[derive(Debug, Clone, Copy, Default)]
pub struct NearDuplicate;

impl ExclusionFilter for NearDuplicate {
    fn stage(&self) -> RejectionStage {
        RejectionStage::NearDuplicate
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        Ok(candidate.distance() < ctx.query.near_duplicate_threshold)
    }
}

/// Candidate was played within the query's recency window
#[derive(Debug, Clone, Copy, Default)]
pub struct RecentlyPlayed;

impl ExclusionFilter for RecentlyPlayed {
    fn stage(&self) -> RejectionStage {
        RejectionStage::RecentlyPlayed
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        ctx.history.was_played_within(
            TrackRef::from(candidate.track),
            ctx.query.recency_window,
            ctx.now,
        )
    }
}

/// How a candidate title is compared with the source filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleMatch {
    /// Lowercased title is a substring of the lowercased filename
    #[default]
    Substring,
    /// Both sides lowercased and stripped to `a-z0-9` before the substring
    /// test; an empty normalized title never matches
    Normalized,
}

impl TitleMatch {
    pub fn matches(&self, title: &str, filename: &str) -> bool {
        match self {
            TitleMatch::Substring => filename.to_lowercase().contains(&title.to_lowercase()),
            TitleMatch::Normalized => {
                let title = normalize(title);
                !title.is_empty() && normalize(filename).contains(&title)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TitleMatch::Substring => "substring",
            TitleMatch::Normalized => "normalized",
        }
    }
}

impl FromStr for TitleMatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "substring" => Ok(TitleMatch::Substring),
            "normalized" => Ok(TitleMatch::Normalized),
            other => Err(format!(
                "unknown title match strategy '{}' (expected 'substring' or 'normalized')",
                other
            )),
        }
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        .collect()
}

/// Candidate title already appears in the source filename
#[derive(Debug, Clone, Copy, Default)]
pub struct TitleInFilename {
    pub strategy: TitleMatch,
}

impl ExclusionFilter for TitleInFilename {
    fn stage(&self) -> RejectionStage {
        RejectionStage::TitleInFilename
    }

    fn rejects(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<bool, StoreError> {
        let (Some(title), Some(filename)) =
            (candidate.track.title(), ctx.query.source_filename.as_deref())
        else {
            return Ok(false);
        };
        Ok(self.strategy.matches(title, filename))
    }
}

/// Ordered sequence of exclusion filters
pub struct FilterChain {
    filters: Vec<Box<dyn ExclusionFilter>>,
}

impl FilterChain {
    /// Custom chain, evaluated in the given order
    pub fn new(filters: Vec<Box<dyn ExclusionFilter>>) -> Self {
        Self { filters }
    }

    /// explicit → identity → path → near-duplicate → recency → title
    pub fn standard(title_match: TitleMatch) -> Self {
        Self::new(vec![
            Box::new(ExplicitExclusion),
            Box::new(SameIdentity),
            Box::new(SamePath),
            Box::new(NearDuplicate),
            Box::new(RecentlyPlayed),
            Box::new(TitleInFilename {
                strategy: title_match,
            }),
        ])
    }

    pub fn stages(&self) -> Vec<RejectionStage> {
        self.filters.iter().map(|f| f.stage()).collect()
    }

    /// First stage that rejects the candidate, or `None` if it survives
    pub fn evaluate(
        &self,
        candidate: &Candidate<'_>,
        ctx: &FilterContext<'_>,
    ) -> Result<Option<RejectionStage>, StoreError> {
        for filter in &self.filters {
            if filter.rejects(candidate, ctx)? {
                return Ok(Some(filter.stage()));
            }
        }
        Ok(None)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::standard(TitleMatch::default())
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("stages", &self.stages())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryLog;
    use crate::scorer::ReferenceVector;
    use chrono::{Duration, TimeZone};
    use smp_common::HistoryEntry;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn reference() -> ResolvedReference {
        ResolvedReference {
            id: Some("ref".into()),
            mbid: Some("mbid-ref".to_string()),
            path: Some("/music/ref.mp3".to_string()),
            vector: ReferenceVector::new(&[1.0, 0.0]).unwrap(),
        }
    }

    fn check(
        chain: &FilterChain,
        track: &Track,
        score: f64,
        query: &SelectionQuery,
        history: &HistoryLog,
    ) -> Option<RejectionStage> {
        let reference = reference();
        let ctx = FilterContext {
            query,
            reference: &reference,
            history,
            now: now(),
        };
        chain.evaluate(&Candidate { track, score }, &ctx).unwrap()
    }

    #[test]
    fn test_standard_order() {
        assert_eq!(
            FilterChain::default().stages(),
            vec![
                RejectionStage::ExplicitExclusion,
                RejectionStage::SameIdentity,
                RejectionStage::SamePath,
                RejectionStage::NearDuplicate,
                RejectionStage::RecentlyPlayed,
                RejectionStage::TitleInFilename,
            ]
        );
    }

    #[test]
    fn test_survivor() {
        let track = Track::new("x", "/music/x.mp3").with_title("Something");
        let query = SelectionQuery::by_id("ref").with_source_filename("01 - Else.mp3");
        assert_eq!(
            check(&FilterChain::default(), &track, 0.8, &query, &HistoryLog::default()),
            None
        );
    }

    #[test]
    fn test_explicit_exclusion() {
        let track = Track::new("x", "/music/x.mp3");
        let query = SelectionQuery::by_id("ref").exclude("x");
        assert_eq!(
            check(&FilterChain::default(), &track, 0.5, &query, &HistoryLog::default()),
            Some(RejectionStage::ExplicitExclusion)
        );
    }

    #[test]
    fn test_same_identity_requires_both_mbids() {
        let chain = FilterChain::default();
        let query = SelectionQuery::by_id("ref");
        let history = HistoryLog::default();

        let same = Track::new("x", "/music/x.mp3").with_mbid("mbid-ref");
        assert_eq!(
            check(&chain, &same, 0.5, &query, &history),
            Some(RejectionStage::SameIdentity)
        );

        let unmatched = Track::new("y", "/music/y.mp3");
        assert_eq!(check(&chain, &unmatched, 0.5, &query, &history), None);

        let empty = Track::new("z", "/music/z.mp3").with_mbid("");
        assert_eq!(check(&chain, &empty, 0.5, &query, &history), None);
    }

    #[test]
    fn test_same_path() {
        let track = Track::new("moved", "/music/ref.mp3");
        assert_eq!(
            check(
                &FilterChain::default(),
                &track,
                0.5,
                &SelectionQuery::by_id("ref"),
                &HistoryLog::default()
            ),
            Some(RejectionStage::SamePath)
        );
    }

    #[test]
    fn test_near_duplicate_is_strictly_below_threshold() {
        let chain = FilterChain::default();
        let history = HistoryLog::default();
        let track = Track::new("x", "/music/x.mp3");
        let query = SelectionQuery::by_id("ref").with_near_duplicate_threshold(0.25);

        // distance 0.2 < 0.25
        assert_eq!(
            check(&chain, &track, 0.8, &query, &history),
            Some(RejectionStage::NearDuplicate)
        );
        // distance 0.5 is kept
        assert_eq!(check(&chain, &track, 0.5, &query, &history), None);
        // exactly at the threshold is kept
        assert_eq!(check(&chain, &track, 0.75, &query, &history), None);
    }

    #[test]
    fn test_recently_played() {
        let track = Track::new("x", "/music/x.mp3");
        let history = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &track,
            now() - Duration::hours(1),
        )]);

        let query = SelectionQuery::by_id("ref").with_recency_window(Duration::hours(2));
        assert_eq!(
            check(&FilterChain::default(), &track, 0.5, &query, &history),
            Some(RejectionStage::RecentlyPlayed)
        );

        let query = SelectionQuery::by_id("ref").with_recency_window(Duration::minutes(30));
        assert_eq!(check(&FilterChain::default(), &track, 0.5, &query, &history), None);
    }

    #[test]
    fn test_title_heuristic_is_case_insensitive() {
        let chain = FilterChain::default();
        let history = HistoryLog::default();
        let track = Track::new("x", "/music/x.mp3").with_title("Yesterday");

        let live = SelectionQuery::by_id("ref").with_source_filename("01 - Yesterday (live).mp3");
        assert_eq!(
            check(&chain, &track, 0.5, &live, &history),
            Some(RejectionStage::TitleInFilename)
        );

        let other = SelectionQuery::by_id("ref").with_source_filename("01 - Tomorrow.mp3");
        assert_eq!(check(&chain, &track, 0.5, &other, &history), None);

        let shouting = SelectionQuery::by_id("ref").with_source_filename("YESTERDAY.MP3");
        assert_eq!(
            check(&chain, &track, 0.5, &shouting, &history),
            Some(RejectionStage::TitleInFilename)
        );
    }

    #[test]
    fn test_title_heuristic_needs_title_and_filename() {
        let chain = FilterChain::default();
        let history = HistoryLog::default();

        let untitled = Track::new("x", "/music/x.mp3");
        let query = SelectionQuery::by_id("ref").with_source_filename("anything.mp3");
        assert_eq!(check(&chain, &untitled, 0.5, &query, &history), None);

        let empty_title = Track::new("y", "/music/y.mp3").with_title("");
        assert_eq!(check(&chain, &empty_title, 0.5, &query, &history), None);

        let titled = Track::new("z", "/music/z.mp3").with_title("anything");
        let no_filename = SelectionQuery::by_id("ref");
        assert_eq!(check(&chain, &titled, 0.5, &no_filename, &history), None);
    }

    #[test]
    fn test_normalized_title_match() {
        assert!(TitleMatch::Normalized.matches("Don't Stop", "03_dont-stop_remaster.mp3"));
        assert!(!TitleMatch::Substring.matches("Don't Stop", "03_dont-stop_remaster.mp3"));
        // Punctuation-only titles normalize to nothing and never match
        assert!(!TitleMatch::Normalized.matches("?!", "anything.mp3"));
    }

    #[test]
    fn test_title_match_parse() {
        assert_eq!("substring".parse::<TitleMatch>(), Ok(TitleMatch::Substring));
        assert_eq!(" Normalized ".parse::<TitleMatch>(), Ok(TitleMatch::Normalized));
        assert!("fuzzy".parse::<TitleMatch>().is_err());
    }

    #[test]
    fn test_first_rejecting_stage_wins() {
        // Excluded, same mbid, same path and recently played: attributed to
        // the first stage only
        let track = Track::new("x", "/music/ref.mp3").with_mbid("mbid-ref");
        let history = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &track,
            now() - Duration::minutes(1),
        )]);
        let query = SelectionQuery::by_id("ref").exclude("x");
        assert_eq!(
            check(&FilterChain::default(), &track, 1.0, &query, &history),
            Some(RejectionStage::ExplicitExclusion)
        );
    }

    #[test]
    fn test_custom_chain() {
        let chain = FilterChain::new(vec![Box::new(NearDuplicate)]);
        let track = Track::new("x", "/music/ref.mp3");
        // Same path, but the custom chain only checks near-duplicates
        assert_eq!(
            check(
                &chain,
                &track,
                0.5,
                &SelectionQuery::by_id("ref"),
                &HistoryLog::default()
            ),
            None
        );
    }
}
