//! Seams to the external account store.
//!
//! The backend is an opaque collaborator: record CRUD, a credential
//! endpoint, privileged impersonation primitives and an append-only audit
//! table. Everything here is a trait so the engine can be exercised against
//! an in-memory double (see `advisorly-infra`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use advisorly_auth::{AuditEntry, AuditFilter, NewAuditEntry};
use advisorly_core::{FirmId, UserId};

use crate::session::Session;

/// Why a session ended. Persisted for the next screen to read and clear.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutReason {
    Manual,
    Expired,
    Error,
}

impl SignOutReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignOutReason::Manual => "manual",
            SignOutReason::Expired => "expired",
            SignOutReason::Error => "error",
        }
    }
}

impl core::fmt::Display for SignOutReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store understood the request and refused it.
    #[error("account store rejected the request: {0}")]
    Rejected(String),

    /// The store could not be reached or answered garbage.
    #[error("account store transport failed: {0}")]
    Transport(String),

    /// The refresh credential is invalid or expired.
    #[error("invalid refresh credential")]
    InvalidRefreshCredential,
}

/// Direct-transport failure (REST fallback path).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("malformed response body: {0}")]
    Body(String),
}

/// Privileged impersonation overlay record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpersonationRecord {
    pub id: Uuid,
    pub impersonator: UserId,
    pub impersonator_email: String,
    pub target: UserId,
    pub target_email: String,
    pub target_firm: Option<FirmId>,
    pub reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// The hosted backend, reduced to the operations this engine needs.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Current persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>, StoreError>;

    /// Exchange the refresh credential for a new session.
    ///
    /// `Ok(None)` means the store answered but produced no new session;
    /// callers treat it the same as an invalid credential.
    async fn refresh_session(&self) -> Result<Option<Session>, StoreError>;

    /// Invalidate the session server-side.
    async fn sign_out(&self) -> Result<(), StoreError>;

    /// Generic record fetch (primary profile path).
    async fn get_record(&self, table: &str, id: &str)
    -> Result<Option<serde_json::Value>, StoreError>;

    async fn start_impersonation(
        &self,
        target: UserId,
        reason: Option<String>,
    ) -> Result<ImpersonationRecord, StoreError>;

    async fn end_impersonation(&self) -> Result<bool, StoreError>;

    async fn active_impersonation(&self) -> Result<Option<ImpersonationRecord>, StoreError>;

    async fn insert_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError>;

    async fn query_audit(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>, StoreError>;
}

/// Lower-level REST record fetch, authenticated with a session bearer token.
///
/// This is the profile loader's fallback when the primary path times out or
/// errors.
#[async_trait]
pub trait DirectTransport: Send + Sync + 'static {
    async fn get_record(
        &self,
        table: &str,
        id: &str,
        bearer: &str,
    ) -> Result<Option<serde_json::Value>, TransportError>;
}

/// Ephemeral client-side storage for the sign-out reason.
pub trait ReasonSink: Send + Sync + 'static {
    fn persist(&self, reason: SignOutReason);

    /// Read and clear, for the next screen.
    fn take(&self) -> Option<SignOutReason>;
}
