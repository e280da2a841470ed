//! Domain user profile derived from a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use advisorly_core::{FirmId, UserId};

use crate::Role;

/// User account status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// User can authenticate and transact.
    #[default]
    Active,
    /// User is blocked from authenticating.
    Suspended,
    /// User is deprovisioned but retained for audit history.
    Inactive,
}

impl core::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            UserStatus::Active => f.write_str("active"),
            UserStatus::Suspended => f.write_str("suspended"),
            UserStatus::Inactive => f.write_str("inactive"),
        }
    }
}

/// Per-user preference bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub theme: String,
    pub notifications_enabled: bool,
    pub email_notifications: bool,
    pub language: String,
    pub timezone: String,
    pub remember_me: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            notifications_enabled: true,
            email_notifications: true,
            language: "en".to_string(),
            timezone: "UTC".to_string(),
            remember_me: false,
        }
    }
}

/// Domain representation of a principal.
///
/// # Invariants
/// - `role` is always drawn from the closed [`Role`] enumeration; a role
///   change takes effect on the next profile reload, never retroactively on
///   an in-flight session.
/// - `firm_id` is `None` only for platform-level principals (super admins)
///   and for degraded profiles whose tenant could not be resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub firm_id: Option<FirmId>,

    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,

    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,

    pub role: Role,
    #[serde(default)]
    pub status: UserStatus,

    #[serde(default)]
    pub preferences: UserPreferences,

    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub login_count: u64,
    #[serde(default)]
    pub mfa_enabled: bool,
    #[serde(default)]
    pub email_verified: bool,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Synthesize a minimal profile from authenticated identity claims.
    ///
    /// Used when both profile resolution paths fail but the principal is
    /// still authenticated: role defaults to `User`, firm is unknown.
    pub fn degraded(
        id: UserId,
        email: impl Into<String>,
        full_name: Option<String>,
        email_verified: bool,
    ) -> Self {
        Self {
            id,
            firm_id: None,
            email: email.into(),
            full_name,
            avatar_url: None,
            job_title: None,
            department: None,
            phone_number: None,
            bio: None,
            role: Role::User,
            status: UserStatus::Active,
            preferences: UserPreferences::default(),
            last_login_at: None,
            login_count: 0,
            mfa_enabled: false,
            email_verified,
            created_at: None,
            updated_at: None,
        }
    }

    /// Check a named permission against this profile's role.
    pub fn has_permission(&self, name: &str) -> bool {
        crate::permissions::has_permission(self.role, name)
    }
}
