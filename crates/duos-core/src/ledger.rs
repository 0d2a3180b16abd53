//! Partnership ledger records.
//!
//! The ledger is append-only: every pairing event inserts a record, and a
//! superseded pairing is deactivated rather than deleted. Records are keyed
//! by the unordered member pair stored in a fixed lexicographic order, plus
//! the ISO week and year the pairing belongs to.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::member::MemberId;

/// Provenance of a pairing event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PairingSource {
    /// Created by the weekly reshuffle
    Automatic,
    /// Created by an admin override
    Manual,
    /// Created by the immediate pairer on registration
    Immediate,
}

impl PairingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairingSource::Automatic => "automatic",
            PairingSource::Manual => "manual",
            PairingSource::Immediate => "immediate",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "manual" => PairingSource::Manual,
            "immediate" => PairingSource::Immediate,
            _ => PairingSource::Automatic,
        }
    }
}

/// A committed pairing for a given week.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnershipRecord {
    /// Unique record identifier
    pub id: String,

    /// First member of the pair (lexicographically smaller id)
    pub member1_id: MemberId,

    /// Second member of the pair
    pub member2_id: MemberId,

    /// ISO-8601 week-of-year (1-53)
    pub week_number: u32,

    /// ISO week-numbering year
    pub year: i32,

    /// When the pairing was committed
    pub pair_date: DateTime<Utc>,

    /// Exactly one active record may exist per member at a time
    pub is_active: bool,

    /// Provenance of the pairing
    pub notes: PairingSource,
}

impl PartnershipRecord {
    /// Create an active record for the week containing `pair_date`.
    ///
    /// Member ids are normalized into lexicographic order so the same
    /// unordered pair always produces the same stored key.
    pub fn new(
        a: impl Into<MemberId>,
        b: impl Into<MemberId>,
        pair_date: DateTime<Utc>,
        notes: PairingSource,
    ) -> Self {
        let (member1_id, member2_id) = pair_key(a.into(), b.into());
        let (week_number, year) = week_of(pair_date);
        Self {
            id: Uuid::new_v4().to_string(),
            member1_id,
            member2_id,
            week_number,
            year,
            pair_date,
            is_active: true,
            notes,
        }
    }

    /// Whether the record involves the given member.
    pub fn involves(&self, id: &str) -> bool {
        self.member1_id == id || self.member2_id == id
    }

    /// The other member of the pair, if `id` is one of the two.
    pub fn partner_of(&self, id: &str) -> Option<&MemberId> {
        if self.member1_id == id {
            Some(&self.member2_id)
        } else if self.member2_id == id {
            Some(&self.member1_id)
        } else {
            None
        }
    }
}

/// Normalize an unordered pair into its fixed stored order.
pub fn pair_key(a: MemberId, b: MemberId) -> (MemberId, MemberId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// ISO week number and ISO week-numbering year for a date.
pub fn week_of(date: DateTime<Utc>) -> (u32, i32) {
    let iso = date.date_naive().iso_week();
    (iso.week(), iso.year())
}
