//! Audited impersonation overlay.
//!
//! Lets a platform operator temporarily assume another principal's identity
//! for support work. The overlay never touches the underlying credential;
//! it records the act in the audit trail, flips the store-side overlay on,
//! and asks the lifecycle manager to re-resolve the effective profile. At
//! most one overlay can be active at a time.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use advisorly_auth::{NewAuditEntry, audit::actions};
use advisorly_core::UserId;

use crate::lifecycle::SessionHandle;
use crate::store::{AccountStore, ImpersonationRecord, StoreError};

#[derive(Debug, Error)]
pub enum ImpersonationError {
    /// Only platform operators may impersonate.
    #[error("the current principal is not permitted to impersonate")]
    NotPermitted,

    /// A second overlay on top of an active one is always rejected.
    #[error("an impersonation session is already active")]
    AlreadyActive,

    #[error("no impersonation session is active")]
    NotActive,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Privileged identity overlay for a signed-in platform operator.
pub struct ImpersonationOverlay<S> {
    store: Arc<S>,
    session: SessionHandle,
}

impl<S: AccountStore> ImpersonationOverlay<S> {
    pub fn new(store: Arc<S>, session: SessionHandle) -> Self {
        Self { store, session }
    }

    /// Begin impersonating `target`.
    ///
    /// Requires the current effective profile to be a platform operator;
    /// nesting is rejected. On success the lifecycle manager has already
    /// re-resolved the profile, so the caller observes the target identity.
    pub async fn start(
        &self,
        target: UserId,
        reason: Option<String>,
    ) -> Result<ImpersonationRecord, ImpersonationError> {
        let operator = self.require_operator()?;

        if self.store.active_impersonation().await?.is_some() {
            return Err(ImpersonationError::AlreadyActive);
        }

        let record = match self.store.start_impersonation(target, reason.clone()).await {
            Ok(record) => record,
            // The store is the arbiter of uniqueness; a concurrent start can
            // still lose the race here.
            Err(StoreError::Rejected(_)) => return Err(ImpersonationError::AlreadyActive),
            Err(err) => return Err(err.into()),
        };

        info!(operator = %operator, target = %target, "impersonation started");
        self.audit(
            NewAuditEntry::new(actions::IMPERSONATION_START)
                .actor(operator)
                .resource("user", target.to_string())
                .details(serde_json::json!({
                    "record_id": record.id,
                    "reason": reason,
                })),
        )
        .await;

        self.session.reload_profile().await;
        Ok(record)
    }

    /// End the active impersonation and restore the operator's own identity.
    pub async fn end(&self) -> Result<(), ImpersonationError> {
        // The effective profile is the target's while the overlay is on, so
        // this cannot demand the operator role; a live session is the gate.
        // A signed-out handle must not end another principal's overlay.
        if !self.session.snapshot().is_authenticated() {
            return Err(ImpersonationError::NotPermitted);
        }

        let Some(record) = self.store.active_impersonation().await? else {
            return Err(ImpersonationError::NotActive);
        };

        if !self.store.end_impersonation().await? {
            return Err(ImpersonationError::NotActive);
        }

        info!(operator = %record.impersonator, target = %record.target, "impersonation ended");
        self.audit(
            NewAuditEntry::new(actions::IMPERSONATION_END)
                .actor(record.impersonator)
                .resource("user", record.target.to_string())
                .details(serde_json::json!({ "record_id": record.id })),
        )
        .await;

        self.session.reload_profile().await;
        Ok(())
    }

    /// The active overlay record, straight from the store.
    pub async fn active(&self) -> Result<Option<ImpersonationRecord>, ImpersonationError> {
        Ok(self.store.active_impersonation().await?)
    }

    fn require_operator(&self) -> Result<UserId, ImpersonationError> {
        let snapshot = self.session.snapshot();
        match snapshot.profile {
            Some(profile) if profile.role.is_super_admin() => Ok(profile.id),
            _ => Err(ImpersonationError::NotPermitted),
        }
    }

    /// Audit failures are logged, never fatal: the overlay state change has
    /// already been committed by the store.
    async fn audit(&self, entry: NewAuditEntry) {
        if let Err(err) = self.store.insert_audit(entry).await {
            warn!(error = %err, "failed to record impersonation audit entry");
        }
    }
}
