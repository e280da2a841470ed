//! `advisorly-auth` — roles, permissions, profiles and audit types.
//!
//! Pure authorization boundary: no IO, no storage, no transport. The account
//! store and the session engine depend on these types; nothing here depends
//! on them.

pub mod audit;
pub mod permissions;
pub mod profile;
pub mod roles;

pub use audit::{AuditEntry, AuditFilter, NewAuditEntry};
pub use permissions::{Permission, has_permission, permissions_for};
pub use profile::{UserPreferences, UserProfile, UserStatus};
pub use roles::Role;
