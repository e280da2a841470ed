//! Static role → permission mapping.
//!
//! The table is built once at first use and never mutated afterwards. Upper
//! roles are constructed by extending the set of the role below them, so the
//! hierarchy invariant (viewer ⊂ user ⊂ admin ⊂ super_admin) holds by
//! construction and is additionally verified in tests.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Closed permission enumeration.
///
/// Wire names use the `module.action` convention (`"clients.view"`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "clients.view")]
    ClientsView,
    #[serde(rename = "clients.create")]
    ClientsCreate,
    #[serde(rename = "clients.update")]
    ClientsUpdate,
    #[serde(rename = "clients.delete")]
    ClientsDelete,
    #[serde(rename = "accounts.view")]
    AccountsView,
    #[serde(rename = "accounts.create")]
    AccountsCreate,
    #[serde(rename = "accounts.update")]
    AccountsUpdate,
    #[serde(rename = "accounts.delete")]
    AccountsDelete,
    #[serde(rename = "fees.view")]
    FeesView,
    #[serde(rename = "fees.create")]
    FeesCreate,
    #[serde(rename = "fees.update")]
    FeesUpdate,
    #[serde(rename = "fees.delete")]
    FeesDelete,
    #[serde(rename = "fees.calculate")]
    FeesCalculate,
    #[serde(rename = "settings.view")]
    SettingsView,
    #[serde(rename = "settings.update")]
    SettingsUpdate,
    #[serde(rename = "users.view")]
    UsersView,
    #[serde(rename = "users.create")]
    UsersCreate,
    #[serde(rename = "users.update")]
    UsersUpdate,
    #[serde(rename = "users.delete")]
    UsersDelete,
    #[serde(rename = "import.upload")]
    ImportUpload,
    #[serde(rename = "import.process")]
    ImportProcess,
    #[serde(rename = "firms.view")]
    FirmsView,
    #[serde(rename = "firms.manage")]
    FirmsManage,
    #[serde(rename = "impersonation.use")]
    ImpersonationUse,
    #[serde(rename = "audit.view")]
    AuditView,
}

impl Permission {
    /// Every defined permission.
    pub const ALL: [Permission; 25] = [
        Permission::ClientsView,
        Permission::ClientsCreate,
        Permission::ClientsUpdate,
        Permission::ClientsDelete,
        Permission::AccountsView,
        Permission::AccountsCreate,
        Permission::AccountsUpdate,
        Permission::AccountsDelete,
        Permission::FeesView,
        Permission::FeesCreate,
        Permission::FeesUpdate,
        Permission::FeesDelete,
        Permission::FeesCalculate,
        Permission::SettingsView,
        Permission::SettingsUpdate,
        Permission::UsersView,
        Permission::UsersCreate,
        Permission::UsersUpdate,
        Permission::UsersDelete,
        Permission::ImportUpload,
        Permission::ImportProcess,
        Permission::FirmsView,
        Permission::FirmsManage,
        Permission::ImpersonationUse,
        Permission::AuditView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ClientsView => "clients.view",
            Permission::ClientsCreate => "clients.create",
            Permission::ClientsUpdate => "clients.update",
            Permission::ClientsDelete => "clients.delete",
            Permission::AccountsView => "accounts.view",
            Permission::AccountsCreate => "accounts.create",
            Permission::AccountsUpdate => "accounts.update",
            Permission::AccountsDelete => "accounts.delete",
            Permission::FeesView => "fees.view",
            Permission::FeesCreate => "fees.create",
            Permission::FeesUpdate => "fees.update",
            Permission::FeesDelete => "fees.delete",
            Permission::FeesCalculate => "fees.calculate",
            Permission::SettingsView => "settings.view",
            Permission::SettingsUpdate => "settings.update",
            Permission::UsersView => "users.view",
            Permission::UsersCreate => "users.create",
            Permission::UsersUpdate => "users.update",
            Permission::UsersDelete => "users.delete",
            Permission::ImportUpload => "import.upload",
            Permission::ImportProcess => "import.process",
            Permission::FirmsView => "firms.view",
            Permission::FirmsManage => "firms.manage",
            Permission::ImpersonationUse => "impersonation.use",
            Permission::AuditView => "audit.view",
        }
    }

    /// Resolve a wire name to a permission; `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Permission> {
        Permission::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

static ROLE_PERMISSIONS: LazyLock<HashMap<Role, HashSet<Permission>>> = LazyLock::new(|| {
    use Permission::*;

    let viewer: HashSet<Permission> = [ClientsView, AccountsView, FeesView].into();

    let mut user = viewer.clone();
    user.extend([
        ClientsCreate,
        ClientsUpdate,
        AccountsCreate,
        AccountsUpdate,
        FeesCreate,
        FeesUpdate,
        FeesCalculate,
        ImportUpload,
        ImportProcess,
    ]);

    let mut admin = user.clone();
    admin.extend([
        ClientsDelete,
        AccountsDelete,
        FeesDelete,
        SettingsView,
        SettingsUpdate,
        UsersView,
        UsersCreate,
        UsersUpdate,
        UsersDelete,
        AuditView,
    ]);

    let mut super_admin = admin.clone();
    super_admin.extend([FirmsView, FirmsManage, ImpersonationUse]);

    HashMap::from([
        (Role::Viewer, viewer),
        (Role::User, user),
        (Role::Admin, admin),
        (Role::SuperAdmin, super_admin),
    ])
});

/// The full permission set granted to a role.
pub fn permissions_for(role: Role) -> &'static HashSet<Permission> {
    // Every role is present in the statically-built table.
    &ROLE_PERMISSIONS[&role]
}

/// Check whether `role` grants the permission named `name`.
///
/// Total over arbitrary input: unknown permission names are simply not
/// granted. Callers use a `false` result to hide or disable functionality;
/// it is never an error.
pub fn has_permission(role: Role, name: &str) -> bool {
    match Permission::from_name(name) {
        Some(permission) => permissions_for(role).contains(&permission),
        None => false,
    }
}
