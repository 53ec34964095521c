use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};

use clinicore_appointments::{Appointment, MaterialUsage};
use clinicore_core::{AggregateId, AggregateRoot, DateRange, DentistId, PatientId};
use clinicore_infra::event_store::{Page, Pagination};
use clinicore_infra::projections::MaterialStockView;
use clinicore_infra::services::ConsumptionSummary;
use clinicore_materials::{Material, StockMovement};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleAppointmentRequest {
    pub patient_id: PatientId,
    pub dentist_id: DentistId,
    pub scheduled_at: DateTime<Utc>,
    pub procedure: String,
    pub declared_value: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotesRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUsageRequest {
    pub material_id: AggregateId,
    pub quantity: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUsageRequest {
    pub quantity: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMovementRequest {
    pub kind: String,
    pub direction: Option<String>,
    pub quantity: Decimal,
    pub note: Option<String>,
    pub appointment_id: Option<AggregateId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMaterialRequest {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    pub unit: String,
    pub description: Option<String>,
    #[serde(default)]
    pub min_stock: Decimal,
    pub unit_price: Decimal,
    pub opening_stock: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepriceMaterialRequest {
    pub unit_price: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct MovementHistoryQuery {
    pub after: Option<u64>,
    pub limit: Option<u32>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl MovementHistoryQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.after, self.limit)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub material_id: Option<AggregateId>,
}

// -------------------------
// Extraction helpers
// -------------------------

/// Malformed bodies are a 400, not the extractor's default 422.
pub fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    body.map(|Json(v)| v).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_body", e.body_text())
    })
}

pub fn parse_query<T>(
    query: Result<Query<T>, QueryRejection>,
) -> Result<T, axum::response::Response> {
    query.map(|Query(v)| v).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_query", e.body_text())
    })
}

pub fn parse_id<T>(raw: &str, what: &'static str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr,
{
    raw.parse::<T>().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        )
    })
}

pub fn date_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<DateRange, axum::response::Response> {
    DateRange::new(from, to).map_err(errors::domain_error_to_response)
}

// -------------------------
// Response mapping
// -------------------------

pub fn appointment_to_json(a: &Appointment) -> JsonValue {
    json!({
        "id": a.id().to_string(),
        "patientId": a.patient_id().map(|p| p.to_string()),
        "dentistId": a.dentist_id().map(|d| d.to_string()),
        "scheduledAt": a.scheduled_at(),
        "procedure": a.procedure(),
        "declaredValue": a.declared_value(),
        "status": a.status().as_str(),
        "notes": a.notes(),
        "materialCost": a.material_cost().ok(),
        "usages": a.usages().iter().map(usage_to_json).collect::<Vec<_>>(),
        "version": a.version(),
    })
}

pub fn usage_to_json(u: &MaterialUsage) -> JsonValue {
    json!({
        "id": u.usage_id.to_string(),
        "appointmentId": u.appointment_id.to_string(),
        "materialId": u.material_id.to_string(),
        "quantity": u.quantity,
        "unitPriceAtUse": u.unit_price_at_use,
        "totalValue": u.total_value,
        "note": u.note,
        "recordedAt": u.recorded_at,
        "recordedBy": u.recorded_by.to_string(),
        "revisedAt": u.revised_at,
    })
}

pub fn material_to_json(m: &Material) -> JsonValue {
    json!({
        "id": m.id().to_string(),
        "code": m.code(),
        "name": m.name(),
        "category": m.category(),
        "unit": m.unit(),
        "description": m.description(),
        "minStock": m.min_stock(),
        "unitPrice": m.unit_price(),
        "stock": m.stock(),
        "active": m.is_active(),
        "lowStock": m.is_low_stock(),
        "version": m.version(),
    })
}

pub fn movement_to_json(mv: &StockMovement) -> JsonValue {
    json!({
        "id": mv.movement_id.to_string(),
        "materialId": mv.material_id.to_string(),
        "kind": mv.kind.kind_str(),
        "direction": mv.kind.direction_str(),
        "quantity": mv.quantity,
        "previousStock": mv.previous_stock,
        "resultingStock": mv.resulting_stock,
        "actorId": mv.actor_id.to_string(),
        "appointmentId": mv.related_appointment_id.map(|a| a.to_string()),
        "usageId": mv.related_usage_id.map(|u| u.to_string()),
        "note": mv.note,
        "occurredAt": mv.occurred_at,
    })
}

pub fn movement_page_to_json(page: Page<StockMovement>) -> JsonValue {
    json!({
        "items": page.items.iter().map(movement_to_json).collect::<Vec<_>>(),
        "next": page.next,
    })
}

pub fn stock_view_to_json(v: MaterialStockView) -> JsonValue {
    json!({
        "id": v.material_id.to_string(),
        "code": v.code,
        "name": v.name,
        "unit": v.unit,
        "stock": v.stock,
        "minStock": v.min_stock,
        "unitPrice": v.unit_price,
        "active": v.active,
    })
}

pub fn summary_to_json(s: &ConsumptionSummary) -> JsonValue {
    json!({
        "totalValue": s.total_value,
        "totalQuantity": s.total_quantity,
        "usageCount": s.usage_count,
    })
}
