use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};

use clinicore_appointments::AppointmentStatus;
use clinicore_auth::Principal;
use clinicore_core::AggregateId;
use clinicore_infra::services::NewAppointment;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(schedule_appointment))
        .route("/:id", get(get_appointment))
        .route("/:id/status", patch(change_status))
        .route("/:id/notes", patch(update_notes))
        .route("/:id/materials", post(add_usage).get(list_usages))
        .route("/:id/materials/total", get(total_material_cost))
        .route("/:id/movements", get(list_movements))
}

pub async fn schedule_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<dto::ScheduleAppointmentRequest>, JsonRejection>,
) -> axum::response::Response {
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let input = NewAppointment {
        patient_id: body.patient_id,
        dentist_id: body.dentist_id,
        scheduled_at: body.scheduled_at,
        procedure: body.procedure,
        declared_value: body.declared_value,
        notes: body.notes,
    };

    match services.workflow.schedule(&principal, input) {
        Ok(a) => (StatusCode::CREATED, Json(dto::appointment_to_json(&a))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_appointment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.workflow.get(&principal, id) {
        Ok(a) => (StatusCode::OK, Json(dto::appointment_to_json(&a))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::ChangeStatusRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target: AppointmentStatus = match body.status.parse() {
        Ok(s) => s,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.workflow.transition(&principal, id, target) {
        Ok(a) => (StatusCode::OK, Json(dto::appointment_to_json(&a))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn update_notes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::UpdateNotesRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.workflow.update_notes(&principal, id, body.notes) {
        Ok(a) => (StatusCode::OK, Json(dto::appointment_to_json(&a))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn add_usage(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    body: Result<Json<dto::AddUsageRequest>, JsonRejection>,
) -> axum::response::Response {
    let appointment_id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match dto::parse_body(body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.consumption.add_usage(
        &principal,
        appointment_id,
        body.material_id,
        body.quantity,
        body.note,
    ) {
        Ok(u) => (StatusCode::CREATED, Json(dto::usage_to_json(&u))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_usages(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.consumption.list_usages(&principal, id) {
        Ok(usages) => {
            let items = usages.iter().map(dto::usage_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn total_material_cost(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.costs.total_material_cost(&principal, id) {
        Ok(total) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "appointmentId": id.to_string(),
                "totalMaterialCost": total,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Stock movements that reference this appointment, across all materials.
pub async fn list_movements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AggregateId = match dto::parse_id(&id, "appointment") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.ledger.movements_for_appointment(&principal, id) {
        Ok(movements) => {
            let items = movements.iter().map(dto::movement_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
