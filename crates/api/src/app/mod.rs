//! HTTP application wiring (Axum router + service wiring).
//!
//! - `services.rs`: in-memory store/bus, application services, stock projection worker
//! - `routes/`: HTTP handlers, one file per resource
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::io;
use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::config::ApiConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the black-box tests).
pub fn build_app(config: &ApiConfig) -> io::Result<Router> {
    let identity = middleware::IdentityState {
        policy: config.role_policy.clone(),
    };
    let services = Arc::new(services::build_services()?);

    // Everything except the health probe needs a caller identity.
    let protected = routes::router()
        .layer(Extension(services))
        .layer(axum::middleware::from_fn_with_state(
            identity,
            middleware::identity_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected))
}
