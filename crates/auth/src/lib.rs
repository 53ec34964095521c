//! `clinicore-auth` — authorization boundary for the clinic core.
//!
//! Authentication (token issuance/verification) happens upstream. This crate only turns a
//! caller identity plus coarse roles into permissions and checks them. No HTTP, no storage.

pub mod authorize;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use permissions::Permission;
pub use policy::{ClinicRolePolicy, RolePolicy};
pub use principal::Principal;
pub use roles::Role;
