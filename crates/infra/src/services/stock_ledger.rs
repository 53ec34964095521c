use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use clinicore_appointments::Appointment;
use clinicore_auth::{Permission, Principal};
use clinicore_core::{AggregateId, DateRange, DomainError, MovementId, Quantity};
use clinicore_materials::{
    AGGREGATE_TYPE, Material, MaterialCommand, MaterialEvent, MovementKind, RecordMovement,
    StockMovement,
};

use super::{JsonEnvelope, require};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, Page, Pagination};
use clinicore_events::EventBus;

/// Manual ledger entry (receipt, exit or correction).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementRequest {
    pub material_id: AggregateId,
    pub kind: MovementKind,
    pub quantity: Decimal,
    pub related_appointment_id: Option<AggregateId>,
    pub note: Option<String>,
}

/// Append-only stock movement log; the only writer of a material's stock level.
#[derive(Debug)]
pub struct StockLedger<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> StockLedger<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    /// Record one movement and return it with its previous/resulting stock.
    pub fn record_movement(
        &self,
        principal: &Principal,
        request: MovementRequest,
    ) -> Result<StockMovement, DispatchError> {
        require(principal, &Permission::STOCK_WRITE)?;
        let quantity = Quantity::new(request.quantity)?;

        if let Some(appointment_id) = request.related_appointment_id {
            let appointment = self.dispatcher.load(appointment_id, Appointment::empty)?;
            if !appointment.aggregate.exists() {
                return Err(DomainError::not_found("appointment", appointment_id).into());
            }
        }

        let command = MaterialCommand::RecordMovement(RecordMovement {
            material_id: request.material_id,
            movement_id: MovementId::new(),
            kind: request.kind,
            quantity,
            actor_id: principal.actor_id,
            related_appointment_id: request.related_appointment_id,
            related_usage_id: None,
            note: request.note,
            occurred_at: Utc::now(),
        });

        let outcome = self
            .dispatcher
            .dispatch(request.material_id, AGGREGATE_TYPE, command, Material::empty)
            .inspect_err(|e| {
                if let Some(DomainError::InsufficientStock { available, requested }) = e.domain() {
                    warn!(
                        material_id = %request.material_id,
                        %available,
                        %requested,
                        "stock movement rejected"
                    );
                }
            })?;

        let movement = outcome
            .events
            .into_iter()
            .find_map(|ev| match ev {
                MaterialEvent::StockMoved(m) => Some(m),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Integrity("movement command produced no movement".into()))?;

        info!(
            material_id = %movement.material_id,
            movement_id = %movement.movement_id,
            kind = %movement.kind,
            quantity = %movement.quantity,
            resulting_stock = %movement.resulting_stock,
            "stock movement recorded"
        );
        Ok(movement)
    }

    /// Current stock level (fold of the movement log).
    pub fn current_stock(
        &self,
        principal: &Principal,
        material_id: AggregateId,
    ) -> Result<Decimal, DispatchError> {
        require(principal, &Permission::MATERIALS_READ)?;
        let loaded = self.dispatcher.load(material_id, Material::empty)?;
        if !loaded.aggregate.is_registered() {
            return Err(DomainError::not_found("material", material_id).into());
        }
        Ok(loaded.aggregate.stock())
    }

    /// Oldest-first movements, optionally restricted to an `occurred_at` range.
    ///
    /// The cursor is the stream sequence number of the last movement returned.
    pub fn history(
        &self,
        principal: &Principal,
        material_id: AggregateId,
        range: DateRange,
        pagination: Pagination,
    ) -> Result<Page<StockMovement>, DispatchError> {
        require(principal, &Permission::MATERIALS_READ)?;

        let stream = self.dispatcher.store().load_stream(material_id)?;
        if stream.is_empty() {
            return Err(DomainError::not_found("material", material_id).into());
        }

        let mut rows = Vec::new();
        for stored in stream {
            let event: MaterialEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            match event {
                MaterialEvent::StockMoved(m) if range.contains(m.occurred_at) => {
                    rows.push((stored.sequence_number, m));
                }
                _ => {}
            }
        }

        let page = Page::collect(rows, pagination);
        debug!(%material_id, returned = page.items.len(), "movement history read");
        Ok(page)
    }

    /// Movements linked to an appointment across every material, oldest first.
    ///
    /// Includes consumption exits, usage reversals and manual entries that referenced the
    /// appointment.
    pub fn movements_for_appointment(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
    ) -> Result<Vec<StockMovement>, DispatchError> {
        require(principal, &Permission::MATERIALS_READ)?;

        let appointment = self.dispatcher.load(appointment_id, Appointment::empty)?;
        if !appointment.aggregate.exists() {
            return Err(DomainError::not_found("appointment", appointment_id).into());
        }

        let mut linked = Vec::new();
        for stored in self.dispatcher.store().load_by_aggregate_type(AGGREGATE_TYPE)? {
            let event: MaterialEvent = serde_json::from_value(stored.payload)
                .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
            if let MaterialEvent::StockMoved(m) = event {
                if m.related_appointment_id == Some(appointment_id) {
                    linked.push(m);
                }
            }
        }
        linked.sort_by_key(|m| m.occurred_at);

        debug!(%appointment_id, returned = linked.len(), "appointment movements read");
        Ok(linked)
    }
}
