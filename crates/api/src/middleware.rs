use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use clinicore_auth::RolePolicy;

use crate::app::errors;
use crate::context::RequestIdentity;

#[derive(Clone)]
pub struct IdentityState {
    pub policy: Arc<dyn RolePolicy>,
}

/// Resolve the caller from identity headers and attach a `Principal` to the request.
///
/// Requests without a usable identity are rejected with 401 before reaching a handler.
pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let identity = RequestIdentity::from_headers(req.headers()).map_err(|e| {
        debug!(error = %e, path = %req.uri().path(), "rejecting request without identity");
        errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", e.to_string())
    })?;

    let principal = identity.into_principal(state.policy.as_ref());
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}
