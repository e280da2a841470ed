//! Profile resolution.
//!
//! Resolves a session into a domain [`UserProfile`], racing the rich primary
//! lookup against a fixed timeout and falling back to a direct REST fetch,
//! then to a synthesized degraded profile. Only a provably absent
//! authenticated principal resolves to "no profile".

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use advisorly_auth::UserProfile;
use advisorly_observability::{DiagnosticsIdentity, identity};

use crate::session::Session;
use crate::store::{AccountStore, DirectTransport};

const PROFILE_TABLE: &str = "user_profiles";

/// Which resolution path produced the profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ProfileOrigin {
    /// Rich query against the account store.
    Primary,
    /// Direct-transport REST fetch with the session bearer token.
    Fallback,
    /// Synthesized from the session's identity claims.
    Degraded,
}

/// A resolved profile plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProfile {
    pub profile: UserProfile,
    pub origin: ProfileOrigin,
}

/// Resolves sessions into profiles.
pub struct ProfileLoader<S, T> {
    store: Arc<S>,
    transport: Arc<T>,
    timeout: Duration,
}

impl<S: AccountStore, T: DirectTransport> ProfileLoader<S, T> {
    pub fn new(store: Arc<S>, transport: Arc<T>, timeout: Duration) -> Self {
        Self {
            store,
            transport,
            timeout,
        }
    }

    /// Resolve the profile for `session`'s principal.
    ///
    /// `None` means logged-in-but-unprovisioned; transient failures never
    /// surface here. On success the resolved identity is published to the
    /// process-wide diagnostics context.
    pub async fn resolve(&self, session: &Session) -> Option<ResolvedProfile> {
        if let Some(profile) = self.primary(session).await {
            return Some(self.publish(profile, ProfileOrigin::Primary));
        }

        if let Some(profile) = self.fallback(session).await {
            return Some(self.publish(profile, ProfileOrigin::Fallback));
        }

        if let Some(claims) = &session.claims {
            warn!(user_id = %claims.user_id, "profile resolution failed; using degraded profile");
            let profile = UserProfile::degraded(
                claims.user_id,
                claims.email.clone(),
                claims.full_name.clone(),
                claims.email_verified,
            );
            return Some(self.publish(profile, ProfileOrigin::Degraded));
        }

        // Authenticated principal with no identity claims and no profile row:
        // logged-in-but-unprovisioned, not an error.
        info!(user_id = %session.user_id, "no profile resolved for principal");
        None
    }

    async fn primary(&self, session: &Session) -> Option<UserProfile> {
        let store = Arc::clone(&self.store);
        let id = session.user_id.to_string();

        // Spawned so a lookup that loses the race is discarded and completes
        // silently, instead of needing cooperative cancellation.
        let lookup = tokio::spawn(async move { store.get_record(PROFILE_TABLE, &id).await });

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(Some(row)))) => parse_profile(row, "primary"),
            Ok(Ok(Ok(None))) => {
                debug!(user_id = %session.user_id, "primary lookup found no profile row");
                None
            }
            Ok(Ok(Err(err))) => {
                warn!(error = %err, "primary profile lookup failed");
                None
            }
            Ok(Err(join_err)) => {
                warn!(error = %join_err, "primary profile lookup task failed");
                None
            }
            Err(_) => {
                warn!(timeout = ?self.timeout, "primary profile lookup timed out");
                None
            }
        }
    }

    async fn fallback(&self, session: &Session) -> Option<UserProfile> {
        let id = session.user_id.to_string();

        match self
            .transport
            .get_record(PROFILE_TABLE, &id, &session.access_token)
            .await
        {
            Ok(Some(row)) => parse_profile(row, "fallback"),
            Ok(None) => {
                debug!(user_id = %session.user_id, "fallback lookup found no profile row");
                None
            }
            Err(err) => {
                warn!(error = %err, "fallback profile lookup failed");
                None
            }
        }
    }

    fn publish(&self, profile: UserProfile, origin: ProfileOrigin) -> ResolvedProfile {
        identity::set(DiagnosticsIdentity {
            user_id: profile.id,
            firm_id: profile.firm_id,
            email: profile.email.clone(),
        });
        ResolvedProfile { profile, origin }
    }
}

fn parse_profile(row: serde_json::Value, path: &str) -> Option<UserProfile> {
    match serde_json::from_value(row) {
        Ok(profile) => Some(profile),
        Err(err) => {
            warn!(error = %err, path, "profile row failed to deserialize");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, Utc};

    use advisorly_auth::Role;
    use advisorly_core::UserId;

    use super::*;
    use crate::session::IdentityClaims;
    use crate::test_support::{MockStore, MockTransport, PrimaryBehavior, profile_row, session_for};

    fn loader(
        store: Arc<MockStore>,
        transport: Arc<MockTransport>,
    ) -> ProfileLoader<MockStore, MockTransport> {
        ProfileLoader::new(store, transport, Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn primary_path_wins_when_it_answers() {
        let user_id = UserId::new();
        let store = Arc::new(MockStore::new());
        store.set_primary(PrimaryBehavior::Row(profile_row(user_id, Role::Admin)));
        let transport = Arc::new(MockTransport::missing());

        let session = session_for(user_id, Utc::now() + ChronoDuration::hours(1));
        let resolved = loader(store, transport).resolve(&session).await.unwrap();

        assert_eq!(resolved.origin, ProfileOrigin::Primary);
        assert_eq!(resolved.profile.id, user_id);
        assert_eq!(resolved.profile.role, Role::Admin);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_primary_falls_back_to_direct_transport() {
        let user_id = UserId::new();
        let store = Arc::new(MockStore::new());
        store.set_primary(PrimaryBehavior::Hang);
        let transport = Arc::new(MockTransport::row(profile_row(user_id, Role::User)));

        let session = session_for(user_id, Utc::now() + ChronoDuration::hours(1));
        let resolved = loader(store, transport.clone())
            .resolve(&session)
            .await
            .unwrap();

        assert_eq!(resolved.origin, ProfileOrigin::Fallback);
        assert_eq!(resolved.profile.id, user_id);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn erroring_primary_falls_back_to_direct_transport() {
        let user_id = UserId::new();
        let store = Arc::new(MockStore::new());
        store.set_primary(PrimaryBehavior::Fail);
        let transport = Arc::new(MockTransport::row(profile_row(user_id, Role::Viewer)));

        let session = session_for(user_id, Utc::now() + ChronoDuration::hours(1));
        let resolved = loader(store, transport).resolve(&session).await.unwrap();

        assert_eq!(resolved.origin, ProfileOrigin::Fallback);
        assert_eq!(resolved.profile.role, Role::Viewer);
    }

    #[tokio::test(start_paused = true)]
    async fn double_failure_synthesizes_degraded_profile() {
        let user_id = UserId::new();
        let store = Arc::new(MockStore::new());
        store.set_primary(PrimaryBehavior::Fail);
        let transport = Arc::new(MockTransport::failing());

        let mut session = session_for(user_id, Utc::now() + ChronoDuration::hours(1));
        session.claims = Some(IdentityClaims {
            user_id,
            email: "claims@firm.test".to_string(),
            full_name: Some("Claims Only".to_string()),
            email_verified: true,
        });

        let resolved = loader(store, transport).resolve(&session).await.unwrap();

        assert_eq!(resolved.origin, ProfileOrigin::Degraded);
        assert_eq!(resolved.profile.role, Role::User);
        assert_eq!(resolved.profile.firm_id, None);
        assert_eq!(resolved.profile.email, "claims@firm.test");
    }

    #[tokio::test(start_paused = true)]
    async fn missing_principal_resolves_to_no_profile() {
        let user_id = UserId::new();
        let store = Arc::new(MockStore::new());
        store.set_primary(PrimaryBehavior::Missing);
        let transport = Arc::new(MockTransport::missing());

        let mut session = session_for(user_id, Utc::now() + ChronoDuration::hours(1));
        session.claims = None;

        let resolved = loader(store, transport).resolve(&session).await;
        assert!(resolved.is_none());
    }
}
