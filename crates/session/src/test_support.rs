//! In-memory doubles shared across the crate's test suites.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use advisorly_auth::{AuditEntry, AuditFilter, NewAuditEntry, Role};
use advisorly_core::UserId;

use crate::session::{IdentityClaims, Session};
use crate::store::{
    AccountStore, DirectTransport, ImpersonationRecord, ReasonSink, SignOutReason, StoreError,
    TransportError,
};

/// How the primary profile lookup behaves.
pub(crate) enum PrimaryBehavior {
    Row(Value),
    Missing,
    Fail,
    /// Never resolves; exercises the lookup timeout.
    Hang,
}

/// Scriptable account store.
///
/// The refresh queue is consumed front-to-back; once empty every further
/// refresh fails with a transport error, so tests that only script the
/// attempts they care about still terminate deterministically.
pub(crate) struct MockStore {
    session: Mutex<Option<Session>>,
    primary: Mutex<PrimaryBehavior>,
    refresh_queue: Mutex<VecDeque<Result<Option<Session>, StoreError>>>,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    audit: Mutex<Vec<AuditEntry>>,
    impersonation: Mutex<Option<ImpersonationRecord>>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self {
            session: Mutex::new(None),
            primary: Mutex::new(PrimaryBehavior::Missing),
            refresh_queue: Mutex::new(VecDeque::new()),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            audit: Mutex::new(Vec::new()),
            impersonation: Mutex::new(None),
        }
    }

    pub(crate) fn set_session(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub(crate) fn set_primary(&self, behavior: PrimaryBehavior) {
        *self.primary.lock().unwrap() = behavior;
    }

    pub(crate) fn push_refresh(&self, outcome: Result<Option<Session>, StoreError>) {
        self.refresh_queue.lock().unwrap().push_back(outcome);
    }

    pub(crate) fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountStore for MockStore {
    async fn get_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.session.lock().unwrap().clone())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, StoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StoreError::Transport("no refresh scripted".to_string())))
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_record(
        &self,
        _table: &str,
        _id: &str,
    ) -> Result<Option<Value>, StoreError> {
        // The behavior is snapshotted before any await so the lock guard
        // never lives across a suspension point.
        enum Step {
            Row(Value),
            Missing,
            Fail,
            Hang,
        }
        let step = match &*self.primary.lock().unwrap() {
            PrimaryBehavior::Row(row) => Step::Row(row.clone()),
            PrimaryBehavior::Missing => Step::Missing,
            PrimaryBehavior::Fail => Step::Fail,
            PrimaryBehavior::Hang => Step::Hang,
        };
        match step {
            Step::Row(row) => Ok(Some(row)),
            Step::Missing => Ok(None),
            Step::Fail => Err(StoreError::Transport("scripted failure".to_string())),
            Step::Hang => std::future::pending().await,
        }
    }

    async fn start_impersonation(
        &self,
        target: UserId,
        reason: Option<String>,
    ) -> Result<ImpersonationRecord, StoreError> {
        let mut active = self.impersonation.lock().unwrap();
        if active.as_ref().is_some_and(|r| r.is_active) {
            return Err(StoreError::Rejected(
                "an impersonation session is already active".to_string(),
            ));
        }
        let impersonator = self
            .session
            .lock()
            .unwrap()
            .as_ref()
            .map(|s| s.user_id)
            .unwrap_or_default();
        let record = ImpersonationRecord {
            id: Uuid::now_v7(),
            impersonator,
            impersonator_email: "operator@platform.test".to_string(),
            target,
            target_email: "target@firm.test".to_string(),
            target_firm: None,
            reason,
            started_at: Utc::now(),
            ended_at: None,
            is_active: true,
        };
        *active = Some(record.clone());
        Ok(record)
    }

    async fn end_impersonation(&self) -> Result<bool, StoreError> {
        let mut active = self.impersonation.lock().unwrap();
        match active.as_mut() {
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
            .impersonation
            .lock()
            .unwrap()
            .clone()
            .filter(|r| r.is_active))
    }

    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        self.audit
            .lock()
            .unwrap()
            .push(entry.into_entry(Utc::now()));
        Ok(())
    }

    async fn query_audit(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StoreError> {
        let entries = self.audit.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| filter.matches(e))
            .skip(filter.offset.unwrap_or(0))
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

enum TransportBehavior {
    Missing,
    Row(Value),
    Fail,
}

/// Scriptable direct-transport fallback.
pub(crate) struct MockTransport {
    behavior: TransportBehavior,
    calls: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn missing() -> Self {
        Self {
            behavior: TransportBehavior::Missing,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn row(row: Value) -> Self {
        Self {
            behavior: TransportBehavior::Row(row),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            behavior: TransportBehavior::Fail,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DirectTransport for MockTransport {
    async fn get_record(
        &self,
        _table: &str,
        _id: &str,
        _bearer: &str,
    ) -> Result<Option<Value>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            TransportBehavior::Missing => Ok(None),
            TransportBehavior::Row(row) => Ok(Some(row.clone())),
            TransportBehavior::Fail => Err(TransportError::Status(503)),
        }
    }
}

/// Reason sink backed by a mutex slot.
#[derive(Default)]
pub(crate) struct MemorySink {
    reason: Mutex<Option<SignOutReason>>,
}

impl ReasonSink for MemorySink {
    fn persist(&self, reason: SignOutReason) {
        *self.reason.lock().unwrap() = Some(reason);
    }

    fn take(&self) -> Option<SignOutReason> {
        self.reason.lock().unwrap().take()
    }
}

/// A store row that deserializes into a [`advisorly_auth::UserProfile`].
pub(crate) fn profile_row(user_id: UserId, role: Role) -> Value {
    serde_json::json!({
        "id": user_id,
        "firm_id": Uuid::now_v7(),
        "email": "advisor@firm.test",
        "full_name": "Test Advisor",
        "role": role,
        "status": "active",
        "login_count": 3,
        "email_verified": true
    })
}

/// A session for `user_id` expiring at `expires_at`, with identity claims.
pub(crate) fn session_for(user_id: UserId, expires_at: DateTime<Utc>) -> Session {
    Session {
        access_token: format!("token-{user_id}"),
        issued_at: Utc::now(),
        expires_at,
        user_id,
        claims: Some(IdentityClaims {
            user_id,
            email: "advisor@firm.test".to_string(),
            full_name: Some("Test Advisor".to_string()),
            email_verified: true,
        }),
    }
}
