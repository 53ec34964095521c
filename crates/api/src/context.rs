use axum::http::HeaderMap;
use thiserror::Error;
use uuid::Uuid;

use clinicore_auth::{Principal, Role, RolePolicy};
use clinicore_core::ActorId;

/// Header carrying the authenticated staff member's id (UUID).
pub const ACTOR_ID_HEADER: &str = "x-actor-id";
/// Header carrying the caller's roles, comma-separated.
pub const ACTOR_ROLES_HEADER: &str = "x-actor-roles";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("missing x-actor-id header")]
    MissingActor,

    #[error("x-actor-id is not a valid UUID")]
    MalformedActor,

    #[error("x-actor-roles is not valid text")]
    MalformedRoles,
}

/// Caller identity as handed over by the upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    actor_id: ActorId,
    roles: Vec<Role>,
}

impl RequestIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, IdentityError> {
        let actor = headers
            .get(ACTOR_ID_HEADER)
            .ok_or(IdentityError::MissingActor)?
            .to_str()
            .map_err(|_| IdentityError::MalformedActor)?;
        let actor_id = Uuid::parse_str(actor.trim())
            .map(ActorId::from_uuid)
            .map_err(|_| IdentityError::MalformedActor)?;

        let roles = match headers.get(ACTOR_ROLES_HEADER) {
            None => Vec::new(),
            Some(raw) => raw
                .to_str()
                .map_err(|_| IdentityError::MalformedRoles)?
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| Role::new(r.to_string()))
                .collect(),
        };

        Ok(Self { actor_id, roles })
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn into_principal(self, policy: &dyn RolePolicy) -> Principal {
        Principal::resolve(self.actor_id, self.roles, policy)
    }
}
