use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use rust_decimal::Decimal;

use clinicore_auth::{Permission, Principal, authorize};
use clinicore_core::AggregateId;
use clinicore_infra::services::{MovementRequest, NewMaterial};
use clinicore_materials::MovementKind;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_material))
        .route("/low-stock", get(low_stock))
        .route("/:id", get(get_material))
        .route("/:id/price", patch(reprice_material))
        .route("/:id/deactivate", post(deactivate_material))
        .route("/:id/activate", post(activate_material))
        .route("/:id/movements", post(record_movement).get(movement_history))
}

pub async fn register_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<dto::RegisterMaterialRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = NewMaterial {
        code: body.code,
        name: body.name,
        category: body.category,
        unit: body.unit,
        description: body.description,
        min_stock: body.min_stock,
        unit_price: body.unit_price,
        opening_stock: body.opening_stock.unwrap_or(Decimal::ZERO),
    };

    match services.catalog.register(&principal, input) {
        Ok(m) => (StatusCode::CREATED, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.get(&principal, id) {
        Ok(m) => (StatusCode::OK, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn reprice_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::RepriceMaterialRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.reprice(&principal, id, body.unit_price) {
        Ok(m) => (StatusCode::OK, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn deactivate_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.deactivate(&principal, id) {
        Ok(m) => (StatusCode::OK, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn activate_material(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.catalog.activate(&principal, id) {
        Ok(m) => (StatusCode::OK, Json(dto::material_to_json(&m))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn record_movement(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::RecordMovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let material_id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let kind = match MovementKind::parse(&body.kind, body.direction.as_deref()) {
        Ok(k) => k,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let request = MovementRequest {
        material_id,
        kind,
        quantity: body.quantity,
        related_appointment_id: body.appointment_id,
        note: body.note,
    };

    match services.ledger.record_movement(&principal, request) {
        Ok(mv) => (StatusCode::CREATED, Json(dto::movement_to_json(&mv))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn movement_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    query: Result<Query<dto::MovementHistoryQuery>, QueryRejection>,
) -> axum::response::Response {
    let material_id: AggregateId = match dto::parse_id(&id, "material") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let query = match dto::parse_query(query) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let range = match dto::date_range(query.from, query.to) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    match services
        .ledger
        .history(&principal, material_id, range, query.pagination())
    {
        Ok(page) => (StatusCode::OK, Json(dto::movement_page_to_json(page))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Active materials at or below their minimum, from the stock projection (eventually consistent).
pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> axum::response::Response {
    if let Err(e) = authorize(&principal, &Permission::MATERIALS_READ) {
        return errors::domain_error_to_response(e.into());
    }

    let items = services
        .stock_view
        .low_stock()
        .into_iter()
        .map(dto::stock_view_to_json)
        .collect::<Vec<_>>();
    (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
}
