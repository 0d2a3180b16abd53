//! Pair compatibility scoring.
//!
//! Scores a candidate pair from a base value, a recency penalty against the
//! history index, and new-member bonuses during the priority pass. A small
//! uniform jitter breaks ties so repeated runs don't settle into the same
//! pairing pattern. The jitter source is seedable for deterministic tests.

use chrono::{DateTime, Utc};
use rand::Rng;
use rand_pcg::Mcg128Xsl64;
use serde::{Deserialize, Serialize};

use crate::history::HistoryIndex;
use crate::member::Member;

/// Sentinel score for a self-pair. Callers must never act on a self-pair
/// regardless of score.
pub const SELF_PAIR_SCORE: f64 = -1000.0;

/// Tunable parameters for the compatibility scorer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Starting score for every candidate pair
    #[serde(default = "default_base_score")]
    pub base_score: f64,

    /// Pairings fewer than this many weeks ago are penalized
    #[serde(default = "default_recency_threshold")]
    pub recency_threshold_weeks: u32,

    /// Penalty per week of recency inside the threshold
    #[serde(default = "default_penalty_per_week")]
    pub penalty_per_week: f64,

    /// Members joined within this many days count as new
    #[serde(default = "default_new_member_window")]
    pub new_member_window_days: i64,

    /// Flat bonus when either member of the pair is new
    #[serde(default = "default_new_member_bonus")]
    pub new_member_bonus: f64,

    /// Extra bonus when exactly one member is new, favoring integration
    /// of newcomers with established members
    #[serde(default = "default_integration_bonus")]
    pub integration_bonus: f64,

    /// Upper bound of the uniform tie-breaking jitter
    #[serde(default = "default_jitter_max")]
    pub jitter_max: f64,

    /// Random seed for reproducibility (None = entropy)
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_base_score() -> f64 {
    100.0
}
fn default_recency_threshold() -> u32 {
    4
}
fn default_penalty_per_week() -> f64 {
    25.0
}
fn default_new_member_window() -> i64 {
    7
}
fn default_new_member_bonus() -> f64 {
    50.0
}
fn default_integration_bonus() -> f64 {
    25.0
}
fn default_jitter_max() -> f64 {
    10.0
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            recency_threshold_weeks: default_recency_threshold(),
            penalty_per_week: default_penalty_per_week(),
            new_member_window_days: default_new_member_window(),
            new_member_bonus: default_new_member_bonus(),
            integration_bonus: default_integration_bonus(),
            jitter_max: default_jitter_max(),
            seed: None,
        }
    }
}

impl ScoringConfig {
    /// A deterministic configuration for tests: fixed seed, zero jitter.
    pub fn deterministic(seed: u64) -> Self {
        Self {
            jitter_max: 0.0,
            seed: Some(seed),
            ..Self::default()
        }
    }
}

/// Scores candidate pairs. Pure apart from the injected jitter source.
#[derive(Debug, Clone)]
pub struct CompatibilityScorer {
    config: ScoringConfig,
}

impl CompatibilityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a candidate pair.
    ///
    /// `new_member_pass` enables the new-member bonuses and is only set
    /// during the matcher's priority pass.
    pub fn score(
        &self,
        a: &Member,
        b: &Member,
        history: &HistoryIndex,
        current_week: u32,
        now: DateTime<Utc>,
        new_member_pass: bool,
        rng: &mut Mcg128Xsl64,
    ) -> f64 {
        if a.id == b.id {
            return SELF_PAIR_SCORE;
        }

        let mut score = self.config.base_score;

        if let Some(last_week) = history.last_week(&a.id, &b.id) {
            let gap = week_gap(current_week, last_week);
            if gap < self.config.recency_threshold_weeks {
                score -= (self.config.recency_threshold_weeks - gap) as f64
                    * self.config.penalty_per_week;
            }
        }

        if new_member_pass {
            let a_new = a.is_new(now, self.config.new_member_window_days);
            let b_new = b.is_new(now, self.config.new_member_window_days);
            if a_new || b_new {
                score += self.config.new_member_bonus;
            }
            if a_new != b_new {
                score += self.config.integration_bonus;
            }
        }

        if self.config.jitter_max > 0.0 {
            score += rng.gen_range(0.0..self.config.jitter_max);
        }

        score
    }
}

/// Weeks elapsed between `last_week` and `current_week`, wrapping modulo 53
/// so a late-December pairing still penalizes an early-January rematch.
fn week_gap(current_week: u32, last_week: u32) -> u32 {
    if current_week >= last_week {
        current_week - last_week
    } else {
        current_week + 53 - last_week
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::SeedableRng;

    fn make_member(id: &str, joined_days_ago: i64) -> Member {
        let mut m = Member::new(id, id);
        m.joined_at = Utc::now() - Duration::days(joined_days_ago);
        m
    }

    fn make_scorer() -> (CompatibilityScorer, Mcg128Xsl64) {
        let config = ScoringConfig::deterministic(42);
        (CompatibilityScorer::new(config), Mcg128Xsl64::seed_from_u64(42))
    }

    #[test]
    fn test_self_pair_sentinel() {
        let (scorer, mut rng) = make_scorer();
        let a = make_member("a", 30);
        let score = scorer.score(&a, &a, &HistoryIndex::empty(), 10, Utc::now(), false, &mut rng);
        assert_eq!(score, SELF_PAIR_SCORE);
    }

    #[test]
    fn test_base_score_without_history_or_bonuses() {
        let (scorer, mut rng) = make_scorer();
        let a = make_member("a", 30);
        let b = make_member("b", 30);
        let score = scorer.score(&a, &b, &HistoryIndex::empty(), 10, Utc::now(), false, &mut rng);
        assert_eq!(score, 100.0);
    }

    #[test]
    fn test_recency_penalty_scales_with_gap() {
        let (scorer, mut rng) = make_scorer();
        let a = make_member("a", 30);
        let b = make_member("b", 30);
        let now = Utc::now();

        // paired last week: maximal penalty, (4 - 1) * 25 = 75
        let mut hist = HistoryIndex::empty();
        hist.insert("a", "b", 10);
        let close = scorer.score(&a, &b, &hist, 11, now, false, &mut rng);
        assert_eq!(close, 25.0);

        // paired 3 weeks ago: light penalty, (4 - 3) * 25 = 25
        let mut hist = HistoryIndex::empty();
        hist.insert("a", "b", 8);
        let far = scorer.score(&a, &b, &hist, 11, now, false, &mut rng);
        assert_eq!(far, 75.0);

        // paired at the threshold: no penalty
        let mut hist = HistoryIndex::empty();
        hist.insert("a", "b", 7);
        let outside = scorer.score(&a, &b, &hist, 11, now, false, &mut rng);
        assert_eq!(outside, 100.0);
    }

    #[test]
    fn test_recency_penalty_wraps_year_boundary() {
        let (scorer, mut rng) = make_scorer();
        let a = make_member("a", 30);
        let b = make_member("b", 30);

        // paired in week 52, scored in week 1: gap of 2
        let mut hist = HistoryIndex::empty();
        hist.insert("a", "b", 52);
        let score = scorer.score(&a, &b, &hist, 1, Utc::now(), false, &mut rng);
        assert_eq!(score, 100.0 - 2.0 * 25.0);
    }

    #[test]
    fn test_new_member_bonuses_only_in_priority_pass() {
        let (scorer, mut rng) = make_scorer();
        let newcomer = make_member("n", 0);
        let veteran = make_member("v", 100);
        let now = Utc::now();
        let hist = HistoryIndex::empty();

        // new + established: flat bonus plus integration bonus
        let mixed = scorer.score(&newcomer, &veteran, &hist, 10, now, true, &mut rng);
        assert_eq!(mixed, 100.0 + 50.0 + 25.0);

        // new + new: flat bonus only
        let other_newcomer = make_member("n2", 1);
        let both_new = scorer.score(&newcomer, &other_newcomer, &hist, 10, now, true, &mut rng);
        assert_eq!(both_new, 100.0 + 50.0);

        // outside the priority pass, no bonus
        let general = scorer.score(&newcomer, &veteran, &hist, 10, now, false, &mut rng);
        assert_eq!(general, 100.0);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = ScoringConfig {
            seed: Some(7),
            ..ScoringConfig::default()
        };
        let scorer = CompatibilityScorer::new(config);
        let mut rng = Mcg128Xsl64::seed_from_u64(7);
        let a = make_member("a", 30);
        let b = make_member("b", 30);
        let hist = HistoryIndex::empty();

        for _ in 0..100 {
            let score = scorer.score(&a, &b, &hist, 10, Utc::now(), false, &mut rng);
            assert!((100.0..110.0).contains(&score));
        }
    }

    #[test]
    fn test_week_gap() {
        assert_eq!(week_gap(11, 10), 1);
        assert_eq!(week_gap(10, 10), 0);
        assert_eq!(week_gap(2, 52), 3);
    }
}
