use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Permission identifier (e.g. `"usages.write"`).
///
/// The wildcard `"*"` grants everything; the default policy gives it to `admin` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const WILDCARD: Permission = Permission(Cow::Borrowed("*"));

    pub const APPOINTMENTS_READ: Permission = Permission(Cow::Borrowed("appointments.read"));
    pub const APPOINTMENTS_SCHEDULE: Permission =
        Permission(Cow::Borrowed("appointments.schedule"));
    pub const APPOINTMENTS_NOTES_WRITE: Permission =
        Permission(Cow::Borrowed("appointments.notes.write"));

    /// Record, revoke and revise material usage on an appointment.
    pub const USAGES_WRITE: Permission = Permission(Cow::Borrowed("usages.write"));

    pub const MATERIALS_READ: Permission = Permission(Cow::Borrowed("materials.read"));
    /// Catalog administration (register, reprice, activate, deactivate).
    pub const MATERIALS_WRITE: Permission = Permission(Cow::Borrowed("materials.write"));
    /// Manual stock movements (entries, exits, adjustments).
    pub const STOCK_WRITE: Permission = Permission(Cow::Borrowed("stock.write"));

    pub const REPORTS_READ: Permission = Permission(Cow::Borrowed("reports.read"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// Permission to move an appointment into `target_status`
    /// (e.g. `"IN_PROGRESS"` -> `"appointments.status.in_progress"`).
    pub fn status_transition(target_status: &str) -> Self {
        Self(Cow::Owned(format!(
            "appointments.status.{}",
            target_status.to_ascii_lowercase()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
