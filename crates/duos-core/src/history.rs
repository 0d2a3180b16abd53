//! Derived pairing-history index.
//!
//! The index maps an unordered member pair to the most recent ISO week the
//! two were paired, built fresh for each reshuffle run from a bounded
//! lookback slice of the ledger. It is never persisted.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::error;

use crate::member::MemberId;
use crate::storage::Database;

/// Default lookback window in weeks.
pub const DEFAULT_LOOKBACK_WEEKS: i64 = 2;

/// Ephemeral unordered-pair -> last-paired-week lookup.
#[derive(Debug, Default)]
pub struct HistoryIndex {
    entries: HashMap<(MemberId, MemberId), u32>,
}

impl HistoryIndex {
    /// An empty index (no repeat-avoidance).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build the index from records with `pair_date >= now - lookback_weeks`.
    ///
    /// Fails soft: on a storage error the reshuffle proceeds with an empty
    /// index, degrading to no repeat-avoidance instead of blocking the run.
    pub fn build(db: &Database, now: DateTime<Utc>, lookback_weeks: i64) -> Self {
        let cutoff = now - Duration::weeks(lookback_weeks);
        match db.records_since(cutoff) {
            Ok(records) => {
                let mut index = Self::empty();
                for record in &records {
                    index.insert(&record.member1_id, &record.member2_id, record.week_number);
                }
                index
            }
            Err(e) => {
                error!("history index build failed, reshuffle will run without repeat-avoidance: {e}");
                Self::empty()
            }
        }
    }

    /// Record that `a` and `b` were paired in `week`. Keeps the most recent
    /// week when the same pair appears more than once in the window.
    pub fn insert(&mut self, a: &str, b: &str, week: u32) {
        for key in [(a.to_string(), b.to_string()), (b.to_string(), a.to_string())] {
            let entry = self.entries.entry(key).or_insert(week);
            if week > *entry {
                *entry = week;
            }
        }
    }

    /// The most recent week `a` and `b` were paired, if within the window.
    pub fn last_week(&self, a: &str, b: &str) -> Option<u32> {
        self.entries.get(&(a.to_string(), b.to_string())).copied()
    }

    /// Number of distinct ordered keys in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{PairingSource, PartnershipRecord};
    use crate::member::Member;

    #[test]
    fn test_insert_is_symmetric() {
        let mut index = HistoryIndex::empty();
        index.insert("a", "b", 10);
        assert_eq!(index.last_week("a", "b"), Some(10));
        assert_eq!(index.last_week("b", "a"), Some(10));
        assert_eq!(index.last_week("a", "c"), None);
    }

    #[test]
    fn test_insert_keeps_most_recent_week() {
        let mut index = HistoryIndex::empty();
        index.insert("a", "b", 8);
        index.insert("a", "b", 11);
        index.insert("a", "b", 9);
        assert_eq!(index.last_week("a", "b"), Some(11));
    }

    #[test]
    fn test_build_respects_lookback_window() {
        let mut db = Database::open_memory().unwrap();
        for id in ["a", "b", "c", "d"] {
            db.insert_member(&Member::new(id, id)).unwrap();
        }

        let now = Utc::now();
        let recent = PartnershipRecord::new("a", "b", now - Duration::days(5), PairingSource::Automatic);
        let stale = PartnershipRecord::new("c", "d", now - Duration::weeks(6), PairingSource::Automatic);
        db.commit_assignments(&[recent, stale], None).unwrap();

        let index = HistoryIndex::build(&db, now, DEFAULT_LOOKBACK_WEEKS);
        assert!(index.last_week("a", "b").is_some());
        assert!(index.last_week("c", "d").is_none());
    }

    #[test]
    fn test_build_includes_inactive_records() {
        let mut db = Database::open_memory().unwrap();
        for id in ["a", "b"] {
            db.insert_member(&Member::new(id, id)).unwrap();
        }
        let now = Utc::now();
        let record = PartnershipRecord::new("a", "b", now - Duration::days(2), PairingSource::Automatic);
        db.commit_assignments(&[record], None).unwrap();
        db.deactivate_active().unwrap();

        // the active flag gates "current" queries, not history
        let index = HistoryIndex::build(&db, now, DEFAULT_LOOKBACK_WEEKS);
        assert!(index.last_week("a", "b").is_some());
    }
}
