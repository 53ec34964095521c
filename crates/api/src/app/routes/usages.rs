use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::patch,
};

use clinicore_auth::Principal;
use clinicore_core::UsageId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/:id", patch(update_usage_quantity).delete(remove_usage))
}

pub async fn update_usage_quantity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateUsageRequest>, JsonRejection>,
) -> axum::response::Response {
    let usage_id: UsageId = match dto::parse_id(&id, "usage") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services
        .consumption
        .update_usage_quantity(&principal, usage_id, body.quantity)
    {
        Ok(u) => (StatusCode::OK, Json(dto::usage_to_json(&u))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn remove_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let usage_id: UsageId = match dto::parse_id(&id, "usage") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.consumption.remove_usage(&principal, usage_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
