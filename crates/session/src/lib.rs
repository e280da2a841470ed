//! `advisorly-session` — session & authorization lifecycle engine.
//!
//! Owns the one piece of this platform with real coordination depth: keeping
//! a principal continuously authenticated against a time-limited credential,
//! degrading gracefully when refresh fails, and layering an audited
//! impersonation overlay on top of the normal identity.
//!
//! The account store itself is an external collaborator, reached only
//! through the seams in [`store`].

pub mod config;
pub mod impersonation;
pub mod inactivity;
pub mod lifecycle;
pub mod loader;
pub mod notifier;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::SessionConfig;
pub use impersonation::{ImpersonationError, ImpersonationOverlay};
pub use inactivity::{ActivityTracker, InactivityMonitor};
pub use lifecycle::{SessionHandle, SessionManager, SessionPhase, SessionSnapshot};
pub use loader::{ProfileLoader, ProfileOrigin, ResolvedProfile};
pub use notifier::{ExpiryNotifier, NotifierHandle, NotifierState};
pub use session::{IdentityClaims, Session};
pub use store::{
    AccountStore, DirectTransport, ImpersonationRecord, ReasonSink, SignOutReason, StoreError,
    TransportError,
};
