//! Rotation engine: reshuffle orchestration, immediate pairing, and admin
//! overrides.
//!
//! The reshuffle is single-flight: a compare-and-swap flag rejects a second
//! trigger while one is running. All pointer mutations funnel through the
//! storage layer's transactional commits, so the symmetry invariant on
//! `current_partner_id` holds on every path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result, StorageError};
use crate::history::HistoryIndex;
use crate::ledger::{week_of, PairingSource, PartnershipRecord};
use crate::matcher::{MatchStatus, Matcher};
use crate::member::{Member, MemberId};
use crate::notify::{Notification, Notifier};
use crate::storage::{ActivePair, Database};

/// Outcome status of a reshuffle run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Fewer than 2 members; the run was a no-op
    InsufficientPool,
}

/// Statistics recorded for each reshuffle run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub status: RunStatus,
    pub pairs_created: usize,
    pub average_score: f64,
    pub leftover_member_id: Option<MemberId>,
    pub week_number: u32,
    pub year: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Read surface for the current cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPairs {
    pub active_pairs: Vec<ActivePair>,
    pub unpaired_members: Vec<Member>,
}

/// The matching and reshuffling engine.
pub struct RotationEngine {
    db: Mutex<Database>,
    notifier: Arc<dyn Notifier>,
    config: EngineConfig,
    reshuffle_running: AtomicBool,
}

/// Resets the single-flight flag when a run ends, normally or by panic.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RotationEngine {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, config: EngineConfig) -> Self {
        Self {
            db: Mutex::new(db),
            notifier,
            config,
            reshuffle_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether a reshuffle is currently executing.
    pub fn is_reshuffling(&self) -> bool {
        self.reshuffle_running.load(Ordering::Acquire)
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        // a poisoned lock still holds consistent data: every write path is
        // a SQLite transaction
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }

    // === Reshuffle orchestration ===

    /// Run a full-pool rematch: deactivate prior pairings, rebuild history,
    /// match, commit, notify.
    ///
    /// Rejected with [`EngineError::ConcurrencyConflict`] if a run is
    /// already in flight. Failures before the commit re-activate the
    /// previously active records so no partial state is visible.
    pub fn reshuffle(&self) -> Result<RunStats> {
        if self
            .reshuffle_running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(EngineError::ConcurrencyConflict(
                "reshuffle already in progress".to_string(),
            ));
        }
        let _guard = RunGuard(&self.reshuffle_running);

        let started_at = Utc::now();
        let (week_number, year) = week_of(started_at);
        let mut db = self.db();

        let deactivated = db.deactivate_active()?;

        let history = HistoryIndex::build(&db, started_at, self.config.lookback_weeks);
        let members = match db.list_members() {
            Ok(members) => members,
            Err(e) => {
                self.compensate(&mut db, &deactivated);
                return Err(e.into());
            }
        };

        let mut matcher = Matcher::new(self.config.scoring);
        let outcome = matcher.run(&members, &history, week_number, started_at);

        if outcome.status == MatchStatus::InsufficientPool {
            self.compensate(&mut db, &deactivated);
            info!(pool = members.len(), "reshuffle skipped: insufficient pool");
            return Ok(RunStats {
                status: RunStatus::InsufficientPool,
                pairs_created: 0,
                average_score: 0.0,
                leftover_member_id: outcome.leftover,
                week_number,
                year,
                started_at,
                finished_at: Utc::now(),
            });
        }

        let records: Vec<PartnershipRecord> = outcome
            .pairs
            .iter()
            .map(|p| {
                PartnershipRecord::new(
                    p.member1_id.clone(),
                    p.member2_id.clone(),
                    started_at,
                    PairingSource::Automatic,
                )
            })
            .collect();

        if let Err(e) = db.commit_assignments(&records, outcome.leftover.as_deref()) {
            self.compensate(&mut db, &deactivated);
            return Err(e.into());
        }
        drop(db);

        let names: HashMap<&str, &str> = members
            .iter()
            .map(|m| (m.id.as_str(), m.name.as_str()))
            .collect();
        for record in &records {
            self.notify_pair(record, &names, week_number);
        }

        let stats = RunStats {
            status: RunStatus::Completed,
            pairs_created: outcome.pairs.len(),
            average_score: outcome.average_score(),
            leftover_member_id: outcome.leftover,
            week_number,
            year,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            pairs = stats.pairs_created,
            avg_score = stats.average_score,
            leftover = ?stats.leftover_member_id,
            week = week_number,
            "reshuffle completed"
        );
        Ok(stats)
    }

    /// Best-effort rollback of the deactivation stage after an aborted run.
    fn compensate(&self, db: &mut Database, deactivated: &[String]) {
        if let Err(e) = db.reactivate(deactivated) {
            warn!("failed to re-activate {} records after aborted reshuffle: {e}", deactivated.len());
        }
    }

    fn notify_pair(&self, record: &PartnershipRecord, names: &HashMap<&str, &str>, week: u32) {
        for (recipient, partner) in [
            (&record.member1_id, &record.member2_id),
            (&record.member2_id, &record.member1_id),
        ] {
            let partner_name = names.get(partner.as_str()).copied().unwrap_or(partner);
            let notification = Notification::weekly_assignment(recipient, partner_name, week);
            if let Err(e) = self.notifier.dispatch(&notification) {
                warn!(recipient = %recipient, "weekly notification failed: {e}");
            }
        }
    }

    // === Registration ===

    /// Add a member to the roster and run the immediate-pairing hook.
    pub fn register_member(&self, id: &str, name: &str) -> Result<Member> {
        let member = Member::new(id, name);
        self.db().insert_member(&member)?;
        info!(member = id, "member registered");
        self.on_member_joined(id);
        Ok(member)
    }

    /// Full roster, unpaired and paired alike.
    pub fn members(&self) -> Result<Vec<Member>> {
        Ok(self.db().list_members()?)
    }

    // === Immediate pairing ===

    /// Registration hook: pair the newcomer with the longest-unpaired
    /// member, if any. Fire-and-forget -- every failure is logged and
    /// swallowed so registration never observes an error.
    pub fn on_member_joined(&self, member_id: &str) {
        match self.immediate_pair(member_id) {
            Ok(Some(record)) => {
                info!(member = member_id, partner = ?record.partner_of(member_id), "immediate pairing committed");
            }
            Ok(None) => {
                info!(member = member_id, "no unpaired candidate; member waits for the weekly reshuffle");
            }
            Err(e) => {
                warn!(member = member_id, "immediate pairing failed: {e}");
            }
        }
    }

    /// Pair a newcomer with the oldest-joined unpaired member.
    ///
    /// Returns `Ok(None)` when the newcomer is already paired or no
    /// candidate exists.
    pub fn immediate_pair(&self, member_id: &str) -> Result<Option<PartnershipRecord>> {
        let now = Utc::now();
        let (week, _) = week_of(now);
        let mut db = self.db();

        let newcomer = db
            .get_member(member_id)?
            .ok_or_else(|| EngineError::Storage(StorageError::UnknownMember(member_id.to_string())))?;
        if !newcomer.is_unpaired() {
            return Ok(None);
        }

        let candidates = db.unpaired_members(Some(member_id))?;
        let Some(welcomer) = candidates.into_iter().next() else {
            return Ok(None);
        };

        let record = PartnershipRecord::new(
            newcomer.id.clone(),
            welcomer.id.clone(),
            now,
            PairingSource::Immediate,
        );
        db.commit_pair_guarded(&record).map_err(|e| match e {
            StorageError::PointerRace(id) => {
                EngineError::ConcurrencyConflict(format!("member {id} was paired concurrently"))
            }
            other => other.into(),
        })?;
        drop(db);

        for notification in [
            Notification::immediate_newcomer(&newcomer.id, &welcomer.name, week),
            Notification::immediate_welcomer(&welcomer.id, &newcomer.name, week),
        ] {
            if let Err(e) = self.notifier.dispatch(&notification) {
                warn!(recipient = %notification.recipient_id, "immediate notification failed: {e}");
            }
        }

        Ok(Some(record))
    }

    // === Admin overrides ===

    /// Manually pair two currently unpaired members.
    pub fn create_manual_pair(&self, id1: &str, id2: &str) -> Result<PartnershipRecord> {
        if id1 == id2 {
            return Err(EngineError::InvalidOverride(
                "cannot pair a member with themself".to_string(),
            ));
        }

        let mut db = self.db();
        for id in [id1, id2] {
            let member = db
                .get_member(id)?
                .ok_or_else(|| EngineError::InvalidOverride(format!("unknown member: {id}")))?;
            if let Some(partner) = member.current_partner_id {
                return Err(EngineError::InvalidOverride(format!(
                    "member {id} is already paired with {partner}"
                )));
            }
        }

        let record = PartnershipRecord::new(id1, id2, Utc::now(), PairingSource::Manual);
        db.commit_pair_guarded(&record).map_err(|e| match e {
            StorageError::PointerRace(id) => {
                EngineError::ConcurrencyConflict(format!("member {id} was paired concurrently"))
            }
            other => other.into(),
        })?;
        info!(member1 = id1, member2 = id2, "manual pair created");
        Ok(record)
    }

    /// Manually dissolve the pairing between two members. Clears both
    /// pointers and deactivates the ledger record; the record stays in
    /// history for scoring.
    pub fn remove_pair(&self, id1: &str, id2: &str) -> Result<()> {
        let mut db = self.db();
        let a = db
            .get_member(id1)?
            .ok_or_else(|| EngineError::InvalidOverride(format!("unknown member: {id1}")))?;
        let b = db
            .get_member(id2)?
            .ok_or_else(|| EngineError::InvalidOverride(format!("unknown member: {id2}")))?;

        let symmetric = a.current_partner_id.as_deref() == Some(id2)
            && b.current_partner_id.as_deref() == Some(id1);
        if !symmetric {
            return Err(EngineError::InvalidOverride(format!(
                "no active pairing between {id1} and {id2}"
            )));
        }

        db.unpair(id1, id2)?;
        info!(member1 = id1, member2 = id2, "pair removed");
        Ok(())
    }

    /// Admin-triggered reshuffle; same single-flight guard as the weekly run.
    pub fn force_reshuffle(&self) -> Result<RunStats> {
        self.reshuffle()
    }

    // === Read surface ===

    /// Active pairs and the members currently without a partner.
    pub fn current_pairs(&self) -> Result<CurrentPairs> {
        let db = self.db();
        Ok(CurrentPairs {
            active_pairs: db.active_pairs()?,
            unpaired_members: db.unpaired_members(None)?,
        })
    }

    /// Most recent ledger records, newest first.
    pub fn pairing_history(&self, limit: usize) -> Result<Vec<PartnershipRecord>> {
        Ok(self.db().history(limit)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::test_support::CollectingNotifier;
    use crate::scoring::ScoringConfig;
    use chrono::Duration;

    fn make_engine_with(notifier: Arc<CollectingNotifier>, member_ids: &[&str]) -> RotationEngine {
        let db = Database::open_memory().unwrap();
        let base = Utc::now() - Duration::days(60);
        for (i, id) in member_ids.iter().enumerate() {
            let mut m = Member::new(*id, format!("Member {id}"));
            m.joined_at = base + Duration::days(i as i64);
            db.insert_member(&m).unwrap();
        }
        let config = EngineConfig {
            scoring: ScoringConfig::deterministic(42),
            ..EngineConfig::default()
        };
        RotationEngine::new(db, notifier, config)
    }

    fn make_engine(member_ids: &[&str]) -> (RotationEngine, Arc<CollectingNotifier>) {
        let notifier = Arc::new(CollectingNotifier::default());
        (make_engine_with(notifier.clone(), member_ids), notifier)
    }

    fn assert_symmetric_pointers(engine: &RotationEngine) {
        let db = engine.db();
        for m in db.list_members().unwrap() {
            if let Some(partner_id) = &m.current_partner_id {
                let partner = db.get_member(partner_id).unwrap().unwrap();
                assert_eq!(
                    partner.current_partner_id.as_deref(),
                    Some(m.id.as_str()),
                    "pointer symmetry broken between {} and {partner_id}",
                    m.id
                );
            }
        }
    }

    #[test]
    fn test_reshuffle_pairs_even_pool() {
        let (engine, notifier) = make_engine(&["a", "b", "c", "d"]);
        let stats = engine.reshuffle().unwrap();

        assert_eq!(stats.status, RunStatus::Completed);
        assert_eq!(stats.pairs_created, 2);
        assert!(stats.leftover_member_id.is_none());
        assert!(stats.average_score > 0.0);
        assert_symmetric_pointers(&engine);
        // two notifications per pair
        assert_eq!(notifier.sent.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_reshuffle_odd_pool_leaves_solo_member() {
        let (engine, _) = make_engine(&["a", "b", "c"]);
        let stats = engine.reshuffle().unwrap();

        assert_eq!(stats.pairs_created, 1);
        let leftover = stats.leftover_member_id.unwrap();
        let solo = engine.db().get_member(&leftover).unwrap().unwrap();
        assert!(solo.is_unpaired());
        assert!(!solo.paired_this_week);
        assert_symmetric_pointers(&engine);
    }

    #[test]
    fn test_reshuffle_deactivates_previous_cycle() {
        let (engine, _) = make_engine(&["a", "b", "c", "d"]);
        engine.create_manual_pair("a", "b").unwrap();
        assert_eq!(engine.current_pairs().unwrap().active_pairs.len(), 1);

        engine.reshuffle().unwrap();

        let current = engine.current_pairs().unwrap();
        assert_eq!(current.active_pairs.len(), 2);
        assert!(current.unpaired_members.is_empty());
        assert!(engine.pairing_history(10).unwrap().len() >= 2);
    }

    #[test]
    fn test_reshuffle_insufficient_pool_is_status_not_error() {
        let (engine, notifier) = make_engine(&["only"]);
        let stats = engine.reshuffle().unwrap();

        assert_eq!(stats.status, RunStatus::InsufficientPool);
        assert_eq!(stats.pairs_created, 0);
        assert!(notifier.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_insufficient_pool_compensates_deactivation() {
        let db = Database::open_memory().unwrap();
        let mut m = Member::new("a", "A");
        m.joined_at = Utc::now() - Duration::days(30);
        db.insert_member(&m).unwrap();
        let engine = RotationEngine::new(
            db,
            Arc::new(CollectingNotifier::default()),
            EngineConfig::default(),
        );
        // seed an active record for a member outside the current pool
        {
            let mut db = engine.db();
            let record = PartnershipRecord::new(
                "gone1",
                "gone2",
                Utc::now() - Duration::weeks(1),
                PairingSource::Automatic,
            );
            db.commit_assignments(&[record], None).unwrap();
        }

        let stats = engine.reshuffle().unwrap();
        assert_eq!(stats.status, RunStatus::InsufficientPool);
        // deactivation was rolled back
        let history = engine.pairing_history(10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_active);
    }

    #[test]
    fn test_notification_failure_does_not_roll_back_commit() {
        let notifier = Arc::new(CollectingNotifier {
            fail_for: vec!["a".to_string()],
            ..CollectingNotifier::default()
        });
        let engine = make_engine_with(notifier.clone(), &["a", "b"]);

        let stats = engine.reshuffle().unwrap();
        assert_eq!(stats.pairs_created, 1);
        assert_symmetric_pointers(&engine);
        // b still got its copy
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient_id, "b");
    }

    #[test]
    fn test_manual_pair_and_invalid_overrides() {
        let (engine, _) = make_engine(&["a", "b", "c"]);

        let record = engine.create_manual_pair("a", "b").unwrap();
        assert_eq!(record.notes, PairingSource::Manual);
        assert_symmetric_pointers(&engine);

        // self pair
        let err = engine.create_manual_pair("c", "c").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOverride(_)));

        // unknown member
        let err = engine.create_manual_pair("c", "ghost").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOverride(_)));
    }

    // Admin pairs A with B while A is already paired with C: rejected, and
    // none of the three members is mutated.
    #[test]
    fn test_manual_pair_rejects_already_paired_without_mutation() {
        let (engine, _) = make_engine(&["a", "b", "c"]);
        engine.create_manual_pair("a", "c").unwrap();

        let err = engine.create_manual_pair("a", "b").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOverride(_)));

        let db = engine.db();
        let a = db.get_member("a").unwrap().unwrap();
        let b = db.get_member("b").unwrap().unwrap();
        let c = db.get_member("c").unwrap().unwrap();
        assert_eq!(a.current_partner_id.as_deref(), Some("c"));
        assert_eq!(c.current_partner_id.as_deref(), Some("a"));
        assert!(b.is_unpaired());
    }

    #[test]
    fn test_remove_pair() {
        let (engine, _) = make_engine(&["a", "b"]);
        engine.create_manual_pair("a", "b").unwrap();

        engine.remove_pair("a", "b").unwrap();
        let current = engine.current_pairs().unwrap();
        assert!(current.active_pairs.is_empty());
        assert_eq!(current.unpaired_members.len(), 2);

        // dissolving again is an invalid override
        let err = engine.remove_pair("a", "b").unwrap_err();
        assert!(matches!(err, EngineError::InvalidOverride(_)));
    }

    #[test]
    fn test_immediate_pairing_picks_longest_unpaired() {
        let (engine, notifier) = make_engine(&["oldest", "middle", "fresh"]);

        let record = engine.immediate_pair("fresh").unwrap().unwrap();
        assert_eq!(record.notes, PairingSource::Immediate);
        assert_eq!(record.partner_of("fresh").unwrap(), "oldest");
        assert_symmetric_pointers(&engine);

        // newcomer and welcomer each get distinct copy
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_ne!(sent[0].title, sent[1].title);
    }

    #[test]
    fn test_immediate_pairing_no_candidates_is_noop() {
        let (engine, notifier) = make_engine(&["a", "b", "fresh"]);
        engine.create_manual_pair("a", "b").unwrap();

        assert!(engine.immediate_pair("fresh").unwrap().is_none());
        assert_eq!(notifier.sent.lock().unwrap().len(), 0);
    }

    #[test]
    fn test_on_member_joined_swallows_errors() {
        let (engine, _) = make_engine(&["a"]);
        // unknown member: must not panic or propagate
        engine.on_member_joined("ghost");
    }

    #[test]
    fn test_current_pairs_is_idempotent() {
        let (engine, _) = make_engine(&["a", "b", "c"]);
        engine.reshuffle().unwrap();

        let first = engine.current_pairs().unwrap();
        let second = engine.current_pairs().unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
    }

    #[test]
    fn test_reshuffle_rejects_concurrent_run() {
        use std::sync::Barrier;

        struct BlockingNotifier {
            start: Barrier,
            release: Barrier,
            first: AtomicBool,
        }
        impl Notifier for BlockingNotifier {
            fn dispatch(&self, _n: &Notification) -> Result<(), Box<dyn std::error::Error>> {
                if self.first.swap(false, Ordering::SeqCst) {
                    self.start.wait();
                    self.release.wait();
                }
                Ok(())
            }
        }

        let notifier = Arc::new(BlockingNotifier {
            start: Barrier::new(2),
            release: Barrier::new(2),
            first: AtomicBool::new(true),
        });
        let db = Database::open_memory().unwrap();
        for id in ["a", "b"] {
            let mut m = Member::new(id, id);
            m.joined_at = Utc::now() - Duration::days(30);
            db.insert_member(&m).unwrap();
        }
        let engine = Arc::new(RotationEngine::new(
            db,
            notifier.clone(),
            EngineConfig::default(),
        ));

        let background = {
            let engine = engine.clone();
            std::thread::spawn(move || engine.reshuffle())
        };

        // wait until the background run is inside notification dispatch,
        // with the single-flight flag still held
        notifier.start.wait();
        let err = engine.reshuffle().unwrap_err();
        assert!(matches!(err, EngineError::ConcurrencyConflict(_)));
        notifier.release.wait();

        let stats = background.join().unwrap().unwrap();
        assert_eq!(stats.status, RunStatus::Completed);
    }
}
