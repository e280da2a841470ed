//! In-memory account store.
//!
//! The development and integration-test backend: real semantics (session
//! issuance and refresh, record storage, single-active impersonation, an
//! append-only audit table) with no I/O. Interior mutability keeps the
//! public surface identical to a remote store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use advisorly_auth::{AuditEntry, AuditFilter, NewAuditEntry};
use advisorly_core::{FirmId, UserId};
use advisorly_session::{
    AccountStore, IdentityClaims, ImpersonationRecord, ReasonSink, Session, SignOutReason,
    StoreError,
};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Default)]
struct State {
    session: Option<Session>,
    refresh_revoked: bool,
    /// table name -> record id -> row.
    records: HashMap<String, HashMap<String, Value>>,
    audit: Vec<AuditEntry>,
    impersonation: Option<ImpersonationRecord>,
}

/// Account store held entirely in process memory.
pub struct MemoryAccountStore {
    state: Mutex<State>,
    session_ttl: Duration,
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Issue and persist a session for `user_id`, as a sign-in would.
    pub fn issue_session(&self, user_id: UserId, email: impl Into<String>) -> Session {
        let now = Utc::now();
        let email = email.into();
        let session = Session {
            access_token: format!("mem-{}", Uuid::now_v7()),
            issued_at: now,
            expires_at: now + chrono::Duration::from_std(self.session_ttl).unwrap_or_default(),
            user_id,
            claims: Some(IdentityClaims {
                user_id,
                email,
                full_name: None,
                email_verified: true,
            }),
        };
        self.state.lock().unwrap().session = Some(session.clone());
        session
    }

    /// Seed or replace a record row.
    pub fn put_record(&self, table: &str, id: &str, row: Value) {
        self.state
            .lock()
            .unwrap()
            .records
            .entry(table.to_string())
            .or_default()
            .insert(id.to_string(), row);
    }

    /// Make every subsequent refresh fail as an invalid credential.
    pub fn revoke_refresh(&self) {
        self.state.lock().unwrap().refresh_revoked = true;
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.state.lock().unwrap().session.clone())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.refresh_revoked {
            return Err(StoreError::InvalidRefreshCredential);
        }
        let Some(current) = &state.session else {
            return Ok(None);
        };

        let now = Utc::now();
        let renewed = Session {
            access_token: format!("mem-{}", Uuid::now_v7()),
            issued_at: now,
            expires_at: now + chrono::Duration::from_std(self.session_ttl).unwrap_or_default(),
            user_id: current.user_id,
            claims: current.claims.clone(),
        };
        debug!(user_id = %renewed.user_id, expires_at = %renewed.expires_at, "session refreshed");
        state.session = Some(renewed.clone());
        Ok(Some(renewed))
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        // The overlay is keyed to the signed-in principal; it ends with them.
        if let Some(record) = state.impersonation.as_mut() {
            if record.is_active {
                record.is_active = false;
                record.ended_at = Some(Utc::now());
            }
        }
        state.session = None;
        state.refresh_revoked = false;
        Ok(())
    }

    async fn get_record(&self, table: &str, id: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .get(table)
            .and_then(|rows| rows.get(id))
            .cloned())
    }

    async fn start_impersonation(
        &self,
        target: UserId,
        reason: Option<String>,
    ) -> Result<ImpersonationRecord, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.impersonation.as_ref().is_some_and(|r| r.is_active) {
            return Err(StoreError::Rejected(
                "an impersonation session is already active".to_string(),
            ));
        }
        let Some(session) = &state.session else {
            return Err(StoreError::Rejected("no active session".to_string()));
        };

        let impersonator = session.user_id;
        let impersonator_email = session
            .claims
            .as_ref()
            .map(|c| c.email.clone())
            .unwrap_or_default();

        // Pull the target's row for the denormalized email/firm columns.
        let target_row = state
            .records
            .get("user_profiles")
            .and_then(|rows| rows.get(&target.to_string()));
        let target_email = target_row
            .and_then(|row| row.get("email"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let target_firm = target_row
            .and_then(|row| row.get("firm_id"))
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<FirmId>().ok());

        let record = ImpersonationRecord {
            id: Uuid::now_v7(),
            impersonator,
            impersonator_email,
            target,
            target_email,
            target_firm,
            reason,
            started_at: Utc::now(),
            ended_at: None,
            is_active: true,
        };
        state.impersonation = Some(record.clone());
        Ok(record)
    }

    async fn end_impersonation(&self) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        match state.impersonation.as_mut() {
            Some(record) if record.is_active => {
                record.is_active = false;
                record.ended_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn active_impersonation(&self) -> Result<Option<ImpersonationRecord>, StoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .impersonation
            .clone()
            .filter(|r| r.is_active))
    }

    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        self.state
            .lock()
            .unwrap()
            .audit
            .push(entry.into_entry(Utc::now()));
        Ok(())
    }

    async fn query_audit(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let state = self.state.lock().unwrap();
        let mut hits: Vec<AuditEntry> = state
            .audit
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // Newest first, then paginate.
        hits.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(hits
            .into_iter()
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect())
    }
}

/// Reason sink backed by a mutex slot. Read-and-clear semantics.
#[derive(Default)]
pub struct MemoryReasonSink {
    reason: Mutex<Option<SignOutReason>>,
}

impl ReasonSink for MemoryReasonSink {
    fn persist(&self, reason: SignOutReason) {
        *self.reason.lock().unwrap() = Some(reason);
    }

    fn take(&self) -> Option<SignOutReason> {
        self.reason.lock().unwrap().take()
    }
}
