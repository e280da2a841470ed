//! Role model for RBAC.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use advisorly_core::DomainError;

/// Closed role enumeration.
///
/// Roles form a strict hierarchy: every permission granted to a lower role
/// is also granted to every role above it (verified in `permissions`).
/// `SuperAdmin` is a platform-level role and is not bound to a single firm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    User,
    Viewer,
}

impl Role {
    /// All roles, ordered from most to least privileged.
    pub const ALL: [Role; 4] = [Role::SuperAdmin, Role::Admin, Role::User, Role::Viewer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::User => "user",
            Role::Viewer => "viewer",
        }
    }

    /// Privilege rank; higher outranks lower.
    pub fn rank(&self) -> u8 {
        match self {
            Role::SuperAdmin => 3,
            Role::Admin => 2,
            Role::User => 1,
            Role::Viewer => 0,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Role::SuperAdmin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "viewer" => Ok(Role::Viewer),
            other => Err(DomainError::validation(format!("unknown role: {other}"))),
        }
    }
}
