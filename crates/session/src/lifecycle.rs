//! Session lifecycle manager.
//!
//! A single scheduler-loop task owns all mutable session state. Timers are
//! modeled as one optional deadline inside the loop rather than chained
//! callbacks, so sign-out deterministically cancels the next refresh before
//! it is ever armed. The rest of the system sees the session only through
//! cloned [`SessionSnapshot`]s on a watch channel.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use advisorly_auth::{NewAuditEntry, UserProfile, audit::actions};
use advisorly_observability::identity;

use crate::config::SessionConfig;
use crate::loader::ProfileLoader;
use crate::session::Session;
use crate::store::{AccountStore, DirectTransport, ReasonSink, SignOutReason, StoreError};

/// Lifecycle states.
///
/// `Expired` is terminal and always transitions immediately into
/// `Unauthenticated` via sign-out.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
    RefreshPending,
    Expired,
}

/// Immutable view of the current session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
    /// Set when a refresh attempt for the current session has failed.
    pub refresh_failed: bool,
    /// Increments on every sign-in; lets observers scope per-session state
    /// (e.g. warning dismissal) without holding session references.
    pub epoch: u64,
}

impl SessionSnapshot {
    fn unauthenticated(epoch: u64) -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            session: None,
            profile: None,
            refresh_failed: false,
            epoch,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Authenticated | SessionPhase::RefreshPending
        )
    }
}

enum Command {
    /// Bootstrap from the store's persisted session, if any.
    Start(oneshot::Sender<()>),
    /// Adopt an externally-established session (sign-in flow).
    SessionStarted(Session),
    /// Re-resolve the profile for the current session.
    ReloadProfile(oneshot::Sender<()>),
    SignOut(SignOutReason),
}

/// Outcome of planning the next refresh for a session.
enum RefreshPlan {
    AlreadyExpired,
    /// Inside the refresh window with the single-shot guard unspent.
    Immediate,
    DeadlineAt(Instant),
}

/// Cloneable handle to the lifecycle manager.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Bootstrap from any persisted session; resolves once the initial
    /// state (authenticated or not) has been published.
    pub async fn start(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Start(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Adopt a freshly-established session (e.g. the auth callback).
    pub fn session_started(&self, session: Session) {
        let _ = self.commands.send(Command::SessionStarted(session));
    }

    /// Force a profile reload; resolves once the new profile is published.
    pub async fn reload_profile(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::ReloadProfile(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    pub fn sign_out(&self, reason: SignOutReason) {
        let _ = self.commands.send(Command::SignOut(reason));
    }

    /// Current state, cloned.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }
}

/// The scheduler-loop actor.
pub struct SessionManager<S, T> {
    store: Arc<S>,
    loader: ProfileLoader<S, T>,
    reasons: Arc<dyn ReasonSink>,
    config: SessionConfig,

    phase: SessionPhase,
    session: Option<Session>,
    profile: Option<UserProfile>,
    refresh_failed: bool,
    epoch: u64,

    /// One-shot deadline for the next proactive refresh.
    refresh_deadline: Option<Instant>,
    /// Single-shot guard: at most one immediate refresh per unhealthy
    /// discovery. Reset only once a session is confirmed healthy.
    immediate_refresh_done: bool,

    snapshots: watch::Sender<SessionSnapshot>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl<S: AccountStore, T: DirectTransport> SessionManager<S, T> {
    /// Spawn the manager task and return its handle.
    pub fn spawn(
        store: Arc<S>,
        transport: Arc<T>,
        reasons: Arc<dyn ReasonSink>,
        config: SessionConfig,
    ) -> SessionHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::unauthenticated(0));

        let loader = ProfileLoader::new(
            Arc::clone(&store),
            transport,
            config.primary_lookup_timeout,
        );

        let manager = Self {
            store,
            loader,
            reasons,
            config,
            phase: SessionPhase::Unauthenticated,
            session: None,
            profile: None,
            refresh_failed: false,
            epoch: 0,
            refresh_deadline: None,
            immediate_refresh_done: false,
            snapshots: snapshot_tx,
            commands: command_rx,
        };

        tokio::spawn(manager.run());

        SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        }
    }

    async fn run(mut self) {
        loop {
            let deadline = self.refresh_deadline;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    // All handles dropped; nothing can reach us anymore.
                    None => break,
                },
                _ = sleep_until_opt(deadline), if deadline.is_some() => {
                    self.on_refresh_due().await;
                }
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(ack) => {
                self.bootstrap().await;
                let _ = ack.send(());
            }
            Command::SessionStarted(session) => {
                self.adopt_session(session, true).await;
            }
            Command::ReloadProfile(ack) => {
                self.reload_profile().await;
                let _ = ack.send(());
            }
            Command::SignOut(reason) => {
                self.sign_out(reason).await;
            }
        }
    }

    async fn bootstrap(&mut self) {
        match self.store.get_session().await {
            Ok(Some(session)) => self.adopt_session(session, false).await,
            Ok(None) => {
                debug!("no persisted session found");
                self.publish();
            }
            Err(err) => {
                warn!(error = %err, "session bootstrap failed");
                self.publish();
            }
        }
    }

    /// Move a session through `Authenticating` into `Authenticated` (or
    /// straight to `Expired` if it is already stale) and arm the refresh
    /// chain.
    async fn adopt_session(&mut self, session: Session, record_login: bool) {
        let now = Utc::now();
        if session.is_expired(now) {
            info!(user_id = %session.user_id, "persisted session already expired");
            self.session = Some(session);
            self.phase = SessionPhase::Expired;
            self.publish();
            self.sign_out(SignOutReason::Expired).await;
            return;
        }

        self.epoch += 1;
        self.refresh_failed = false;
        self.immediate_refresh_done = false;
        self.phase = SessionPhase::Authenticating;
        self.session = Some(session);
        self.publish();

        self.resolve_profile().await;

        if record_login {
            self.record_login().await;
        }

        self.phase = SessionPhase::Authenticated;
        self.publish();

        self.arm_refresh().await;
    }

    async fn resolve_profile(&mut self) {
        // The loop owns `self.session`; clone the credential for the loader.
        let Some(session) = self.session.clone() else {
            return;
        };
        self.profile = self.loader.resolve(&session).await.map(|r| r.profile);
    }

    async fn reload_profile(&mut self) {
        if self.session.is_none() {
            return;
        }
        self.resolve_profile().await;
        self.publish();
    }

    async fn record_login(&mut self) {
        let Some(session) = &self.session else { return };
        let mut entry = NewAuditEntry::new(actions::LOGIN).actor(session.user_id);
        if let Some(profile) = &self.profile {
            if let Some(firm_id) = profile.firm_id {
                entry = entry.firm(firm_id);
            }
        }
        if let Err(err) = self.store.insert_audit(entry).await {
            warn!(error = %err, "failed to record login audit entry");
        }
    }

    /// Decide what to do about the next refresh for `session`.
    fn plan_refresh(&self, session: &Session) -> RefreshPlan {
        let now = Utc::now();
        if session.is_expired(now) {
            return RefreshPlan::AlreadyExpired;
        }

        let refresh_at = session.refresh_at(self.config.refresh_margin);
        if refresh_at <= now {
            if !self.immediate_refresh_done {
                return RefreshPlan::Immediate;
            }
            // Guard already spent: let the deadline carry us to expiry,
            // where the refresh attempt settles the session's fate.
            let delay = (session.expires_at - now).to_std().unwrap_or_default();
            return RefreshPlan::DeadlineAt(Instant::now() + delay);
        }

        let delay = (refresh_at - now).to_std().unwrap_or_default();
        RefreshPlan::DeadlineAt(Instant::now() + delay)
    }

    /// Arm the one-shot refresh deadline at `expiry − margin`, attempting an
    /// immediate refresh when the session is discovered already inside its
    /// window.
    async fn arm_refresh(&mut self) {
        let Some(session) = self.session.clone() else { return };
        match self.plan_refresh(&session) {
            RefreshPlan::AlreadyExpired => {
                self.phase = SessionPhase::Expired;
                self.publish();
                self.sign_out(SignOutReason::Expired).await;
            }
            RefreshPlan::Immediate => {
                // Exactly one immediate attempt; a failure forces sign-out,
                // so the guard never needs resetting on that path.
                self.immediate_refresh_done = true;
                info!("session inside refresh window; attempting immediate refresh");
                self.do_refresh().await;
            }
            RefreshPlan::DeadlineAt(deadline) => {
                self.refresh_deadline = Some(deadline);
                debug!("refresh timer armed");
            }
        }
    }

    async fn on_refresh_due(&mut self) {
        self.refresh_deadline = None;
        // A deadline observed after sign-out has begun is a no-op.
        if self.session.is_none() {
            return;
        }
        self.do_refresh().await;
    }

    /// The single outstanding refresh attempt. The actor awaits it inline,
    /// so a second attempt cannot start until this one resolves. Re-arming
    /// stays inside the loop so a short-lived replacement session can chain
    /// straight into another attempt.
    async fn do_refresh(&mut self) {
        loop {
            self.phase = SessionPhase::RefreshPending;
            self.publish();

            match self.store.refresh_session().await {
                Ok(Some(new_session)) if !new_session.is_expired(Utc::now()) => {
                    info!(expires_at = %new_session.expires_at, "session refreshed");
                    let healthy =
                        new_session.refresh_at(self.config.refresh_margin) > Utc::now();
                    if healthy {
                        self.immediate_refresh_done = false;
                    }
                    self.session = Some(new_session.clone());
                    self.refresh_failed = false;
                    self.phase = SessionPhase::Authenticated;
                    self.publish();

                    match self.plan_refresh(&new_session) {
                        RefreshPlan::AlreadyExpired => {
                            self.phase = SessionPhase::Expired;
                            self.publish();
                            self.sign_out(SignOutReason::Expired).await;
                            return;
                        }
                        RefreshPlan::Immediate => {
                            self.immediate_refresh_done = true;
                            continue;
                        }
                        RefreshPlan::DeadlineAt(deadline) => {
                            self.refresh_deadline = Some(deadline);
                            return;
                        }
                    }
                }
                Ok(_) => {
                    warn!("refresh produced no usable session");
                    self.fail_refresh(SignOutReason::Expired).await;
                    return;
                }
                // The store answered and refused the credential.
                Err(err @ (StoreError::Rejected(_) | StoreError::InvalidRefreshCredential)) => {
                    warn!(error = %err, "refresh credential rejected");
                    self.fail_refresh(SignOutReason::Expired).await;
                    return;
                }
                // The refresh call itself failed.
                Err(err) => {
                    warn!(error = %err, "refresh call failed");
                    self.fail_refresh(SignOutReason::Error).await;
                    return;
                }
            }
        }
    }

    async fn fail_refresh(&mut self, reason: SignOutReason) {
        self.refresh_failed = true;
        self.phase = SessionPhase::Expired;
        self.publish();
        self.sign_out(reason).await;
    }

    /// The single serialization point: cancel the pending deadline, clear
    /// session/profile/diagnostics state, persist the reason, publish
    /// `Unauthenticated`. Partial cleanup is a correctness bug.
    async fn sign_out(&mut self, reason: SignOutReason) {
        if self.session.is_none() && self.phase == SessionPhase::Unauthenticated {
            return;
        }
        info!(reason = %reason, "signing out");

        self.refresh_deadline = None;

        self.end_impersonation_on_sign_out().await;

        if let Err(err) = self.store.sign_out().await {
            // Server-side invalidation failing must not leave the client in
            // an ambiguous state; local cleanup proceeds regardless.
            warn!(error = %err, "server-side sign-out failed");
        }

        self.session = None;
        self.profile = None;
        self.refresh_failed = false;
        identity::clear();
        self.reasons.persist(reason);

        self.phase = SessionPhase::Unauthenticated;
        self.publish();
    }

    /// An overlay is a per-principal resource: it must not survive its
    /// impersonator's sign-out, or the next operator would be blocked by a
    /// stale overlay.
    async fn end_impersonation_on_sign_out(&mut self) {
        let record = match self.store.active_impersonation().await {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(err) => {
                warn!(error = %err, "failed to check for an active impersonation during sign-out");
                return;
            }
        };

        if let Err(err) = self.store.end_impersonation().await {
            warn!(error = %err, "failed to end impersonation during sign-out");
            return;
        }

        info!(target = %record.target, "active impersonation ended by sign-out");
        let entry = NewAuditEntry::new(actions::IMPERSONATION_END)
            .actor(record.impersonator)
            .resource("user", record.target.to_string())
            .details(serde_json::json!({
                "record_id": record.id,
                "ended_by": "sign_out",
            }));
        if let Err(err) = self.store.insert_audit(entry).await {
            warn!(error = %err, "failed to record impersonation audit entry");
        }
    }

    fn publish(&self) {
        let _ = self.snapshots.send(SessionSnapshot {
            phase: self.phase,
            session: self.session.clone(),
            profile: self.profile.clone(),
            refresh_failed: self.refresh_failed,
            epoch: self.epoch,
        });
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
