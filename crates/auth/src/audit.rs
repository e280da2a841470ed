//! Append-only audit trail types.
//!
//! The application layer only ever inserts audit entries; updates and
//! deletes are not modeled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use advisorly_core::{FirmId, UserId};

/// Well-known audit action names.
pub mod actions {
    pub const LOGIN: &str = "auth.login";
    pub const SIGN_OUT: &str = "auth.sign_out";
    pub const ROLE_CHANGE: &str = "users.role_change";
    pub const STATUS_CHANGE: &str = "users.status_change";
    pub const IMPERSONATION_START: &str = "impersonation.start";
    pub const IMPERSONATION_END: &str = "impersonation.end";
}

/// A recorded security-relevant action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub actor: Option<UserId>,
    pub firm_id: Option<FirmId>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

/// An audit entry about to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub actor: Option<UserId>,
    pub firm_id: Option<FirmId>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl NewAuditEntry {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            actor: None,
            firm_id: None,
            action: action.into(),
            resource_type: None,
            resource_id: None,
            details: None,
        }
    }

    pub fn actor(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }

    pub fn firm(mut self, firm_id: FirmId) -> Self {
        self.firm_id = Some(firm_id);
        self
    }

    pub fn resource(mut self, kind: impl Into<String>, id: impl Into<String>) -> Self {
        self.resource_type = Some(kind.into());
        self.resource_id = Some(id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Stamp the entry for persistence.
    pub fn into_entry(self, now: DateTime<Utc>) -> AuditEntry {
        AuditEntry {
            id: Uuid::now_v7(),
            created_at: now,
            actor: self.actor,
            firm_id: self.firm_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
        }
    }
}

/// Read-side filter for audit queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub actor: Option<UserId>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditFilter {
    /// Whether `entry` passes the filter (pagination excluded).
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = self.actor {
            if entry.actor != Some(actor) {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if &entry.action != action {
                return false;
            }
        }
        if let Some(kind) = &self.resource_type {
            if entry.resource_type.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.created_at > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_complete_entry() {
        let actor = UserId::new();
        let entry = NewAuditEntry::new(actions::IMPERSONATION_START)
            .actor(actor)
            .resource("user", "target-1")
            .details(serde_json::json!({ "reason": "support ticket 4411" }))
            .into_entry(Utc::now());

        assert_eq!(entry.action, "impersonation.start");
        assert_eq!(entry.actor, Some(actor));
        assert_eq!(entry.resource_type.as_deref(), Some("user"));
    }

    #[test]
    fn filter_matches_on_action_and_actor() {
        let actor = UserId::new();
        let entry = NewAuditEntry::new(actions::LOGIN)
            .actor(actor)
            .into_entry(Utc::now());

        let hit = AuditFilter {
            actor: Some(actor),
            action: Some(actions::LOGIN.to_string()),
            ..Default::default()
        };
        let miss = AuditFilter {
            action: Some(actions::SIGN_OUT.to_string()),
            ..Default::default()
        };

        assert!(hit.matches(&entry));
        assert!(!miss.matches(&entry));
    }
}
