//! Process-wide diagnostics identity.
//!
//! Error reports and diagnostics are tagged with the currently signed-in
//! principal so production issues can be correlated to a user. The session
//! engine sets the identity when a profile resolves and clears it on
//! sign-out; everything else only reads.

use std::sync::RwLock;

use serde::Serialize;

use advisorly_core::{FirmId, UserId};

/// Identity attached to outgoing diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsIdentity {
    pub user_id: UserId,
    pub firm_id: Option<FirmId>,
    pub email: String,
}

static CURRENT: RwLock<Option<DiagnosticsIdentity>> = RwLock::new(None);

/// Tag diagnostics with the signed-in principal.
pub fn set(identity: DiagnosticsIdentity) {
    tracing::debug!(user_id = %identity.user_id, "diagnostics identity set");
    if let Ok(mut guard) = CURRENT.write() {
        *guard = Some(identity);
    }
}

/// Clear the identity tag (sign-out).
pub fn clear() {
    if let Ok(mut guard) = CURRENT.write() {
        if guard.take().is_some() {
            tracing::debug!("diagnostics identity cleared");
        }
    }
}

/// Snapshot the current identity tag, if any.
pub fn current() -> Option<DiagnosticsIdentity> {
    CURRENT.read().ok().and_then(|guard| guard.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    // The static is process-global, so exercise the full cycle in one test
    // to avoid cross-test interference.
    #[test]
    fn set_then_clear_round_trip() {
        let identity = DiagnosticsIdentity {
            user_id: UserId::new(),
            firm_id: None,
            email: "ops@firm.test".to_string(),
        };

        set(identity.clone());
        assert_eq!(current(), Some(identity));

        clear();
        assert_eq!(current(), None);
    }
}
