//! Session model: the time-bounded credential issued by the account store.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use advisorly_core::UserId;

/// Minimal identity claims embedded in a session.
///
/// These are the already-authenticated facts a degraded profile can be
/// synthesized from when full resolution fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

/// Time-bounded access credential.
///
/// Owned exclusively by the session lifecycle manager; replaced (never
/// mutated) on every refresh and destroyed on sign-out. The refresh
/// credential itself stays inside the account store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer credential.
    pub access_token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Owning principal.
    pub user_id: UserId,
    /// Identity claims, when the issuing flow embedded them.
    #[serde(default)]
    pub claims: Option<IdentityClaims>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Time left until expiry; zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> ChronoDuration {
        (self.expires_at - now).max(ChronoDuration::zero())
    }

    /// The instant proactive refresh should fire.
    pub fn refresh_at(&self, margin: std::time::Duration) -> DateTime<Utc> {
        self.expires_at - ChronoDuration::from_std(margin).unwrap_or_else(|_| ChronoDuration::zero())
    }
}
