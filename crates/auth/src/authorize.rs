use thiserror::Error;
use tracing::debug;

use clinicore_core::DomainError;

use crate::{Permission, Principal};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Forbidden(perm) => {
                DomainError::permission_denied(format!("missing permission '{perm}'"))
            }
        }
    }
}

/// Check that `principal` holds `required` (or the wildcard).
///
/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .permissions
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        debug!(actor_id = %principal.actor_id, permission = %required, "authorization denied");
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClinicRolePolicy, Role};
    use clinicore_core::ActorId;

    fn principal(roles: &[Role]) -> Principal {
        Principal::resolve(ActorId::new(), roles.to_vec(), &ClinicRolePolicy)
    }

    #[test]
    fn admin_wildcard_grants_everything() {
        let admin = principal(&[Role::ADMIN]);
        assert!(authorize(&admin, &Permission::STOCK_WRITE).is_ok());
        assert!(authorize(&admin, &Permission::status_transition("CANCELLED")).is_ok());
    }

    #[test]
    fn dentist_cannot_cancel_or_touch_stock() {
        let dentist = principal(&[Role::DENTIST]);
        assert!(authorize(&dentist, &Permission::status_transition("IN_PROGRESS")).is_ok());

        let err = authorize(&dentist, &Permission::status_transition("CANCELLED")).unwrap_err();
        assert_eq!(
            err,
            AuthzError::Forbidden("appointments.status.cancelled".to_string())
        );
        assert!(authorize(&dentist, &Permission::USAGES_WRITE).is_err());
        assert!(authorize(&dentist, &Permission::STOCK_WRITE).is_err());
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let nobody = principal(&[Role::new("janitor")]);
        assert!(nobody.permissions.is_empty());
        assert!(authorize(&nobody, &Permission::APPOINTMENTS_READ).is_err());
    }

    #[test]
    fn multiple_roles_merge_permissions() {
        let both = principal(&[Role::DENTIST, Role::RECEPTIONIST]);
        assert!(authorize(&both, &Permission::USAGES_WRITE).is_ok());
        assert!(authorize(&both, &Permission::status_transition("COMPLETED")).is_ok());
    }

    #[test]
    fn forbidden_maps_to_permission_denied() {
        let err: DomainError = AuthzError::Forbidden("stock.write".into()).into();
        assert!(matches!(err, DomainError::PermissionDenied(msg) if msg.contains("stock.write")));
    }
}
