//! # Duos Core Library
//!
//! This library provides the core business logic for Duos, a weekly partner
//! matching and reshuffling engine. It implements a CLI-first philosophy
//! where all operations are available via a standalone CLI binary; hosting
//! layers (a bot, a web service) are thin shells over the same core library.
//!
//! ## Architecture
//!
//! - **Engine**: reshuffle orchestration, immediate pairing for newcomers,
//!   and validated admin overrides, with a single-flight guard on runs
//! - **Matcher**: two-phase greedy matching (new-member priority pass, then
//!   a shuffled general pass) over compatibility scores
//! - **Storage**: SQLite-backed member roster and partnership ledger, with
//!   transactional pointer updates
//! - **Weekly**: the scheduled trigger loop that fires the reshuffle
//!
//! ## Key Components
//!
//! - [`RotationEngine`]: orchestration and overrides
//! - [`Matcher`] / [`CompatibilityScorer`]: pair selection
//! - [`Database`]: roster and ledger persistence
//! - [`Notifier`]: trait seam for notification transports

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod ledger;
pub mod matcher;
pub mod member;
pub mod notify;
pub mod scoring;
pub mod storage;
pub mod weekly;

pub use config::{EngineConfig, ScheduleConfig};
pub use engine::{CurrentPairs, RotationEngine, RunStats, RunStatus};
pub use error::{ConfigError, EngineError, Result, StorageError};
pub use history::HistoryIndex;
pub use ledger::{PairingSource, PartnershipRecord};
pub use matcher::{MatchOutcome, MatchStatus, MatchedPair, Matcher};
pub use member::{Member, MemberId};
pub use notify::{LogNotifier, Notification, Notifier};
pub use scoring::{CompatibilityScorer, ScoringConfig};
pub use storage::{ActivePair, Database};
pub use weekly::{next_run_after, WeeklyScheduler};
