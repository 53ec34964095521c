use serde::{Deserialize, Serialize};

use clinicore_core::ActorId;

use crate::{Permission, Role, RolePolicy};

/// A fully resolved caller for authorization decisions.
///
/// Built from the identity handed over by the authentication collaborator and the
/// effective permissions of its roles under a [`RolePolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub actor_id: ActorId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn resolve(actor_id: ActorId, roles: Vec<Role>, policy: &dyn RolePolicy) -> Self {
        let mut permissions: Vec<Permission> = Vec::new();
        for role in &roles {
            for perm in policy.permissions_for(role) {
                if !permissions.contains(&perm) {
                    permissions.push(perm);
                }
            }
        }

        Self {
            actor_id,
            roles,
            permissions,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.contains(role)
    }
}
