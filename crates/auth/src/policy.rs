//! Role → permission policies.

use crate::{Permission, Role};

/// Maps a coarse role to the permissions it grants.
///
/// Supplied to the core as a collaborator so deployments can swap the mapping without
/// touching the services.
pub trait RolePolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn permissions_for(&self, role: &Role) -> Vec<Permission>;
}

/// Default clinic policy.
///
/// - `admin`: everything.
/// - `receptionist`: scheduling, every status change, usage and stock writes, catalog admin.
/// - `dentist`: clinical status changes (confirm, start, complete) plus reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClinicRolePolicy;

impl ClinicRolePolicy {
    pub const NAME: &'static str = "clinic-default";
}

const READS: [Permission; 3] = [
    Permission::APPOINTMENTS_READ,
    Permission::MATERIALS_READ,
    Permission::REPORTS_READ,
];

impl RolePolicy for ClinicRolePolicy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn permissions_for(&self, role: &Role) -> Vec<Permission> {
        match role.as_str() {
            "admin" => vec![Permission::WILDCARD],
            "receptionist" => {
                let mut perms = READS.to_vec();
                perms.extend([
                    Permission::APPOINTMENTS_SCHEDULE,
                    Permission::APPOINTMENTS_NOTES_WRITE,
                    Permission::status_transition("CONFIRMED"),
                    Permission::status_transition("IN_PROGRESS"),
                    Permission::status_transition("COMPLETED"),
                    Permission::status_transition("CANCELLED"),
                    Permission::USAGES_WRITE,
                    Permission::STOCK_WRITE,
                    Permission::MATERIALS_WRITE,
                ]);
                perms
            }
            "dentist" => {
                let mut perms = READS.to_vec();
                perms.extend([
                    Permission::status_transition("CONFIRMED"),
                    Permission::status_transition("IN_PROGRESS"),
                    Permission::status_transition("COMPLETED"),
                ]);
                perms
            }
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grants(role: Role, perm: &Permission) -> bool {
        ClinicRolePolicy
            .permissions_for(&role)
            .iter()
            .any(|p| p.is_wildcard() || p == perm)
    }

    #[test]
    fn dentist_moves_clinical_statuses_but_not_stock() {
        assert!(grants(Role::DENTIST, &Permission::status_transition("IN_PROGRESS")));
        assert!(grants(Role::DENTIST, &Permission::REPORTS_READ));
        assert!(!grants(Role::DENTIST, &Permission::status_transition("CANCELLED")));
        assert!(!grants(Role::DENTIST, &Permission::USAGES_WRITE));
        assert!(!grants(Role::DENTIST, &Permission::STOCK_WRITE));
    }

    #[test]
    fn receptionist_runs_the_front_desk() {
        for perm in [
            Permission::APPOINTMENTS_SCHEDULE,
            Permission::status_transition("CANCELLED"),
            Permission::USAGES_WRITE,
            Permission::STOCK_WRITE,
            Permission::MATERIALS_WRITE,
        ] {
            assert!(grants(Role::RECEPTIONIST, &perm), "missing {perm}");
        }
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        assert!(ClinicRolePolicy.permissions_for(&Role::new("janitor")).is_empty());
        assert_eq!(ClinicRolePolicy.name(), "clinic-default");
    }
}
