//! Process configuration read from the environment.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use clinicore_auth::{ClinicRolePolicy, RolePolicy};

pub const BIND_ADDR_VAR: &str = "CLINICORE_BIND_ADDR";
pub const ROLE_POLICY_VAR: &str = "CLINICORE_ROLE_POLICY";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid socket address: {value}")]
    InvalidBindAddr { var: &'static str, value: String },
}

#[derive(Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub role_policy: Arc<dyn RolePolicy>,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("role_policy", &self.role_policy.name())
            .finish()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            role_policy: Arc::new(ClinicRolePolicy),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (the process environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_addr = lookup(BIND_ADDR_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr
            .trim()
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr {
                var: BIND_ADDR_VAR,
                value: raw_addr.clone(),
            })?;

        let role_policy = role_policy_named(lookup(ROLE_POLICY_VAR).as_deref());

        Ok(Self {
            bind_addr,
            role_policy,
        })
    }
}

fn role_policy_named(name: Option<&str>) -> Arc<dyn RolePolicy> {
    match name.map(str::trim) {
        None | Some("") => Arc::new(ClinicRolePolicy),
        Some(ClinicRolePolicy::NAME) => Arc::new(ClinicRolePolicy),
        Some(other) => {
            warn!(
                requested = other,
                fallback = ClinicRolePolicy::NAME,
                "unknown role policy; using default"
            );
            Arc::new(ClinicRolePolicy)
        }
    }
}
