//! History accessor
//!
//! Read-only view over past plays. An entry refers to a track by id when the
//! id was known at play time, otherwise by path only.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use smp_common::time::window_start;
use smp_common::{HistoryEntry, Track, TrackId};

use crate::error::StoreError;

/// Track identity as seen by the history accessor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackRef<'a> {
    pub id: Option<&'a TrackId>,
    pub path: Option<&'a str>,
}

impl<'a> TrackRef<'a> {
    pub fn by_id(id: &'a TrackId) -> Self {
        Self {
            id: Some(id),
            path: None,
        }
    }

    pub fn by_path(path: &'a str) -> Self {
        Self {
            id: None,
            path: Some(path),
        }
    }
}

impl<'a> From<&'a Track> for TrackRef<'a> {
    fn from(track: &'a Track) -> Self {
        Self {
            id: Some(&track.id),
            path: Some(track.path.as_str()),
        }
    }
}

/// Read-only play history
pub trait History: Send + Sync {
    /// Most recent play of `track`, if any
    fn last_played(&self, track: TrackRef<'_>) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// True iff `track` was played at or after `now - window`
    ///
    /// The window boundary is inclusive.
    fn was_played_within(
        &self,
        track: TrackRef<'_>,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let cutoff = window_start(now, window);
        Ok(self
            .last_played(track)?
            .is_some_and(|played_at| played_at >= cutoff))
    }
}

/// In-memory history snapshot indexed by latest play
///
/// Matching rules:
/// - a reference with an id matches entries carrying that id, plus
///   path-only entries with an equal path;
/// - a reference without an id matches any entry with an equal path.
#[derive(Debug, Clone, Default)]
pub struct HistoryLog {
    latest_by_id: HashMap<TrackId, DateTime<Utc>>,
    latest_by_path_only: HashMap<String, DateTime<Utc>>,
    latest_by_path: HashMap<String, DateTime<Utc>>,
    entries: usize,
}

impl HistoryLog {
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        let mut log = Self::default();
        for entry in entries {
            log.entries += 1;
            if let Some(path) = &entry.path {
                bump(&mut log.latest_by_path, path.clone(), entry.played_at);
            }
            match (entry.track_id, entry.path) {
                (Some(id), _) => bump(&mut log.latest_by_id, id, entry.played_at),
                (None, Some(path)) => bump(&mut log.latest_by_path_only, path, entry.played_at),
                (None, None) => {}
            }
        }
        log
    }

    /// Number of entries the snapshot was built from
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

fn bump<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, DateTime<Utc>>,
    key: K,
    played_at: DateTime<Utc>,
) {
    map.entry(key)
        .and_modify(|latest| *latest = (*latest).max(played_at))
        .or_insert(played_at);
}

impl History for HistoryLog {
    fn last_played(&self, track: TrackRef<'_>) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest = match track.id {
            Some(id) => {
                let by_id = self.latest_by_id.get(id).copied();
                let by_path = track
                    .path
                    .and_then(|p| self.latest_by_path_only.get(p).copied());
                by_id.max(by_path)
            }
            None => track.path.and_then(|p| self.latest_by_path.get(p).copied()),
        };
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn track(id: &str, path: &str) -> Track {
        Track::new(id, path)
    }

    #[test]
    fn test_played_within_window_by_id() {
        let a = track("a", "/m/a.mp3");
        let log = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &a,
            now() - Duration::hours(1),
        )]);

        assert!(log
            .was_played_within(TrackRef::from(&a), Duration::hours(2), now())
            .unwrap());
        assert!(!log
            .was_played_within(TrackRef::from(&a), Duration::minutes(30), now())
            .unwrap());
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let a = track("a", "/m/a.mp3");
        let log = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &a,
            now() - Duration::hours(2),
        )]);

        assert!(log
            .was_played_within(TrackRef::from(&a), Duration::hours(2), now())
            .unwrap());
        assert!(!log
            .was_played_within(
                TrackRef::from(&a),
                Duration::hours(2) - Duration::seconds(1),
                now()
            )
            .unwrap());
    }

    #[test]
    fn test_path_only_entry_matches_by_path() {
        let a = track("a", "/m/a.mp3");
        let log = HistoryLog::from_entries(vec![HistoryEntry::for_path(
            "/m/a.mp3",
            now() - Duration::minutes(5),
        )]);

        assert!(log
            .was_played_within(TrackRef::from(&a), Duration::hours(1), now())
            .unwrap());
        assert!(log
            .was_played_within(TrackRef::by_path("/m/a.mp3"), Duration::hours(1), now())
            .unwrap());
    }

    #[test]
    fn test_id_entry_does_not_match_other_track_at_same_path() {
        // Track "a" was re-cataloged as "b" at the old path; the id-bearing
        // entry belongs to "a" only.
        let a = track("a", "/m/x.mp3");
        let b = track("b", "/m/x.mp3");
        let log = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &a,
            now() - Duration::minutes(5),
        )]);

        assert!(!log
            .was_played_within(TrackRef::from(&b), Duration::hours(1), now())
            .unwrap());
        // Path-only references still see it
        assert!(log
            .was_played_within(TrackRef::by_path("/m/x.mp3"), Duration::hours(1), now())
            .unwrap());
    }

    #[test]
    fn test_latest_play_wins() {
        let a = track("a", "/m/a.mp3");
        let log = HistoryLog::from_entries(vec![
            HistoryEntry::for_track(&a, now() - Duration::days(3)),
            HistoryEntry::for_track(&a, now() - Duration::minutes(10)),
            HistoryEntry::for_track(&a, now() - Duration::days(1)),
        ]);

        assert_eq!(
            log.last_played(TrackRef::from(&a)).unwrap(),
            Some(now() - Duration::minutes(10))
        );
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_unplayed_track() {
        let log = HistoryLog::default();
        assert!(log.is_empty());
        assert_eq!(
            log.last_played(TrackRef::by_id(&TrackId::from("a"))).unwrap(),
            None
        );
        assert!(!log
            .was_played_within(TrackRef::by_id(&TrackId::from("a")), Duration::MAX, now())
            .unwrap());
    }

    #[test]
    fn test_huge_window_covers_everything() {
        let a = track("a", "/m/a.mp3");
        let log = HistoryLog::from_entries(vec![HistoryEntry::for_track(
            &a,
            Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap(),
        )]);
        assert!(log
            .was_played_within(TrackRef::from(&a), Duration::MAX, now())
            .unwrap());
    }
}
