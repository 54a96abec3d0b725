//! Staff roles and the permission table.
//!
//! The role set is closed. Every (role, permission) pair is spelled out in
//! [`can`] so adding a variant to either enum forces the table to be updated.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Wire names for each role. These match the `users.role` column values.
pub const ROLE_MIDWIFE: &str = "midwife";
pub const ROLE_HEALTH_WORKER: &str = "bhw";
pub const ROLE_ADMIN: &str = "admin";

/// A staff member's role.
///
/// `Midwife` is the primary clinical role and `HealthWorker` (barangay health
/// worker) the secondary one. `Admin` manages the system but does not take
/// part in clinical notification fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "midwife")]
    Midwife,
    #[serde(rename = "bhw")]
    HealthWorker,
    #[serde(rename = "admin")]
    Admin,
}

/// Roles whose holders receive peer notifications.
pub const CLINICAL_ROLES: [Role; 2] = [Role::Midwife, Role::HealthWorker];

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Midwife => ROLE_MIDWIFE,
            Role::HealthWorker => ROLE_HEALTH_WORKER,
            Role::Admin => ROLE_ADMIN,
        }
    }

    /// Human-readable role name used in notification metadata.
    pub fn label(self) -> &'static str {
        match self {
            Role::Midwife => "Midwife",
            Role::HealthWorker => "Barangay Health Worker",
            Role::Admin => "Administrator",
        }
    }

    pub fn is_clinical(self) -> bool {
        CLINICAL_ROLES.contains(&self)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_MIDWIFE => Ok(Role::Midwife),
            ROLE_HEALTH_WORKER => Ok(Role::HealthWorker),
            ROLE_ADMIN => Ok(Role::Admin),
            other => Err(CoreError::UnknownRole(other.to_string())),
        }
    }
}

/// An action gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    RecordPrenatalCheckup,
    RegisterChild,
    RecordImmunization,
    ManageVaccineStock,
    ManageUsers,
    ViewReports,
}

impl Permission {
    pub const ALL: [Permission; 6] = [
        Permission::RecordPrenatalCheckup,
        Permission::RegisterChild,
        Permission::RecordImmunization,
        Permission::ManageVaccineStock,
        Permission::ManageUsers,
        Permission::ViewReports,
    ];
}

/// Whether `role` is allowed to perform `permission`.
pub fn can(role: Role, permission: Permission) -> bool {
    use Permission::*;

    match (role, permission) {
        (Role::Admin, ManageUsers | ManageVaccineStock | ViewReports) => true,
        (Role::Admin, RecordPrenatalCheckup | RegisterChild | RecordImmunization) => false,

        (Role::Midwife, RecordPrenatalCheckup | RegisterChild | RecordImmunization) => true,
        (Role::Midwife, ManageVaccineStock | ViewReports) => true,
        (Role::Midwife, ManageUsers) => false,

        (Role::HealthWorker, RecordPrenatalCheckup | RegisterChild) => true,
        (Role::HealthWorker, RecordImmunization | ManageVaccineStock) => false,
        (Role::HealthWorker, ManageUsers | ViewReports) => false,
    }
}

/// Like [`can`], but returns `CoreError::Forbidden` when denied.
pub fn require(role: Role, permission: Permission) -> Result<(), CoreError> {
    if can(role, permission) {
        Ok(())
    } else {
        Err(CoreError::Forbidden(format!(
            "{} may not {permission:?}",
            role.label()
        )))
    }
}
