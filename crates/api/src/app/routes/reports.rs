use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Query, rejection::QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use clinicore_auth::Principal;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/consumption", get(consumption_report))
        .route("/usages", get(usage_report))
}

/// Consumed value over a period; quantity is only reported when filtered to one material.
pub async fn consumption_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<dto::ConsumptionReportQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match dto::parse_query(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let range = match dto::date_range(query.from, query.to) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.costs.summary(&principal, range, query.material_id) {
        Ok(summary) => (StatusCode::OK, Json(dto::summary_to_json(&summary))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Individual usages recorded in a period, oldest first.
pub async fn usage_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<dto::ConsumptionReportQuery>, QueryRejection>,
) -> axum::response::Response {
    let query = match dto::parse_query(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let range = match dto::date_range(query.from, query.to) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services.costs.usages(&principal, range, query.material_id) {
        Ok(usages) => {
            let items = usages.iter().map(dto::usage_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
