//! Community member model.
//!
//! Members are created by the surrounding registration flow and enter this
//! subsystem as soon as they exist. The engine never deletes a member; it
//! only rewrites the partner pointers it owns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a member.
pub type MemberId = String;

/// A member of the partner rotation pool.
///
/// `current_partner_id`, `paired_this_week` and `last_paired_with_id` are
/// owned exclusively by the engine (reshuffle, immediate pairing, admin
/// overrides) and must never be written by any other path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    /// Unique member identifier
    pub id: MemberId,

    /// Display name, used in notification copy
    pub name: String,

    /// When the member registered
    pub joined_at: DateTime<Utc>,

    /// Current partner, if any. Symmetric: if A points at B, B points at A.
    pub current_partner_id: Option<MemberId>,

    /// Whether the member was paired during the current cycle
    pub paired_this_week: bool,

    /// Most recent partner, kept as a repeat-avoidance fallback
    pub last_paired_with_id: Option<MemberId>,
}

impl Member {
    /// Create an unpaired member joining now.
    pub fn new(id: impl Into<MemberId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            joined_at: Utc::now(),
            current_partner_id: None,
            paired_this_week: false,
            last_paired_with_id: None,
        }
    }

    /// Whether the member joined within `window_days` of `now`.
    pub fn is_new(&self, now: DateTime<Utc>, window_days: i64) -> bool {
        now - self.joined_at <= Duration::days(window_days)
    }

    /// Whether the member currently has no partner.
    pub fn is_unpaired(&self) -> bool {
        self.current_partner_id.is_none()
    }
}
