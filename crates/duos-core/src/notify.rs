//! Notification seam.
//!
//! The engine only constructs payloads and hands them off; delivery
//! (push/email/etc.) lives behind the [`Notifier`] trait. Dispatch is
//! best-effort: a failed delivery is logged and never rolls back the
//! pairing it announces.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::member::MemberId;

/// A notification request handed to the external dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub recipient_id: MemberId,
    pub title: String,
    pub body: String,
    /// Structured payload for the transport (partner id, week number, kind)
    pub data: serde_json::Value,
}

impl Notification {
    /// Weekly assignment message.
    pub fn weekly_assignment(recipient_id: &str, partner_name: &str, week: u32) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            title: "Your partner for this week".to_string(),
            body: format!("You are paired with {partner_name} for week {week}."),
            data: json!({ "kind": "weekly", "partner_name": partner_name, "week": week }),
        }
    }

    /// Message for the newcomer in an immediate pairing.
    pub fn immediate_newcomer(recipient_id: &str, partner_name: &str, week: u32) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            title: "Welcome! You have a partner".to_string(),
            body: format!("Welcome aboard -- {partner_name} is your partner this week."),
            data: json!({ "kind": "immediate_newcomer", "partner_name": partner_name, "week": week }),
        }
    }

    /// Message for the existing member welcoming a newcomer.
    pub fn immediate_welcomer(recipient_id: &str, partner_name: &str, week: u32) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            title: "New partner assigned".to_string(),
            body: format!("{partner_name} just joined and is your partner this week."),
            data: json!({ "kind": "immediate_welcomer", "partner_name": partner_name, "week": week }),
        }
    }
}

/// Every notification transport implements this trait. Implementations are
/// expected to be cheap to call; slow transports should queue internally.
pub trait Notifier: Send + Sync {
    /// Hand a notification to the transport.
    fn dispatch(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>>;
}

/// Log-only notifier, the default when no transport is wired up.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn dispatch(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(
            recipient = %notification.recipient_id,
            title = %notification.title,
            "notification: {}",
            notification.body
        );
        Ok(())
    }
}
