use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Role identifier supplied by the upstream identity provider.
///
/// Roles stay opaque strings here; the mapping to permissions belongs to a
/// [`RolePolicy`](crate::RolePolicy).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const DENTIST: Role = Role(Cow::Borrowed("dentist"));
    pub const RECEPTIONIST: Role = Role(Cow::Borrowed("receptionist"));

    /// Role names are case-insensitive at the edge; stored lowercase and trimmed.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        let name = name.into();
        let normalized = name.trim().to_ascii_lowercase();
        if normalized == name {
            Self(name)
        } else {
            Self(Cow::Owned(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
