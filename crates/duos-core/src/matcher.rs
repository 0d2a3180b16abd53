//! Two-phase greedy pair matcher.
//!
//! Phase 1 gives newly joined members first pick of established partners;
//! phase 2 matches the rest of the pool in randomized order. The phase
//! order encodes a priority policy, not an implementation detail: newcomers
//! must be placed before the general pass can consume the established pool.
//!
//! This is a greedy nearest-best-neighbor heuristic, not a maximum-weight
//! matching. It commits the best pair it can see for one seeker at a time.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Mcg128Xsl64;
use serde::Serialize;

use crate::history::HistoryIndex;
use crate::member::{Member, MemberId};
use crate::scoring::{CompatibilityScorer, ScoringConfig};

/// A pair selected by the matcher, with its compatibility score.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedPair {
    pub member1_id: MemberId,
    pub member2_id: MemberId,
    pub score: f64,
}

/// Outcome status of a matcher run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// At least one pair was produced
    Matched,
    /// Fewer than 2 members in the pool; no pairs produced
    InsufficientPool,
}

/// Result of a matcher run over a member snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    /// The single unmatched member when the pool size is odd
    pub leftover: Option<MemberId>,
    pub status: MatchStatus,
}

impl MatchOutcome {
    /// Mean score across produced pairs, 0.0 when empty.
    pub fn average_score(&self) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        self.pairs.iter().map(|p| p.score).sum::<f64>() / self.pairs.len() as f64
    }
}

/// Greedy matcher over a member snapshot.
pub struct Matcher {
    scorer: CompatibilityScorer,
    rng: Mcg128Xsl64,
}

impl Matcher {
    /// Create a matcher. The scoring config's seed drives both the jitter
    /// and the phase-2 shuffle; `None` seeds from entropy.
    pub fn new(config: ScoringConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
            None => Mcg128Xsl64::from_entropy(),
        };
        Self {
            scorer: CompatibilityScorer::new(config),
            rng,
        }
    }

    /// Match the full snapshot into pairs plus at most one leftover.
    pub fn run(
        &mut self,
        members: &[Member],
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
    ) -> MatchOutcome {
        if members.len() < 2 {
            return MatchOutcome {
                pairs: Vec::new(),
                leftover: members.first().map(|m| m.id.clone()),
                status: MatchStatus::InsufficientPool,
            };
        }

        let mut consumed = vec![false; members.len()];
        let mut pairs = Vec::new();

        self.new_member_pass(members, history, current_week, now, &mut consumed, &mut pairs);
        self.general_pass(members, history, current_week, now, &mut consumed, &mut pairs);

        let leftover = consumed
            .iter()
            .position(|&c| !c)
            .map(|i| members[i].id.clone());

        MatchOutcome {
            pairs,
            leftover,
            status: MatchStatus::Matched,
        }
    }

    /// Phase 1: each new member picks the best-scoring established partner,
    /// falling back to other new members when the established pool runs out.
    fn new_member_pass(
        &mut self,
        members: &[Member],
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
        consumed: &mut [bool],
        pairs: &mut Vec<MatchedPair>,
    ) {
        let window = self.scorer.config().new_member_window_days;
        let new_idx: Vec<usize> = (0..members.len())
            .filter(|&i| members[i].is_new(now, window))
            .collect();
        let existing_idx: Vec<usize> = (0..members.len())
            .filter(|&i| !members[i].is_new(now, window))
            .collect();

        for &seeker in &new_idx {
            if consumed[seeker] {
                continue;
            }
            let mut best =
                self.best_candidate(members, seeker, &existing_idx, consumed, history, current_week, now);
            if best.is_none() {
                best = self.best_candidate(members, seeker, &new_idx, consumed, history, current_week, now);
            }
            if let Some((partner, score)) = best {
                consumed[seeker] = true;
                consumed[partner] = true;
                pairs.push(MatchedPair {
                    member1_id: members[seeker].id.clone(),
                    member2_id: members[partner].id.clone(),
                    score,
                });
            }
        }
    }

    /// Phase 2: remaining members in randomized order, each taking the
    /// best-scoring partner left in the pool.
    fn general_pass(
        &mut self,
        members: &[Member],
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
        consumed: &mut [bool],
        pairs: &mut Vec<MatchedPair>,
    ) {
        let mut remaining: Vec<usize> = (0..members.len()).filter(|&i| !consumed[i]).collect();
        // randomized order avoids positional bias toward early joiners
        remaining.shuffle(&mut self.rng);

        for &seeker in &remaining {
            if consumed[seeker] {
                continue;
            }
            let candidates: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| i != seeker)
                .collect();
            if let Some((partner, score)) = self.best_general_candidate(
                members,
                seeker,
                &candidates,
                consumed,
                history,
                current_week,
                now,
            ) {
                consumed[seeker] = true;
                consumed[partner] = true;
                pairs.push(MatchedPair {
                    member1_id: members[seeker].id.clone(),
                    member2_id: members[partner].id.clone(),
                    score,
                });
            }
        }
    }

    fn best_candidate(
        &mut self,
        members: &[Member],
        seeker: usize,
        pool: &[usize],
        consumed: &[bool],
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for &candidate in pool {
            if candidate == seeker || consumed[candidate] {
                continue;
            }
            let score = self.scorer.score(
                &members[seeker],
                &members[candidate],
                history,
                current_week,
                now,
                true,
                &mut self.rng,
            );
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best
    }

    fn best_general_candidate(
        &mut self,
        members: &[Member],
        seeker: usize,
        pool: &[usize],
        consumed: &[bool],
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
    ) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for &candidate in pool {
            if consumed[candidate] {
                continue;
            }
            let score = self.scorer.score(
                &members[seeker],
                &members[candidate],
                history,
                current_week,
                now,
                false,
                &mut self.rng,
            );
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best
    }
}
