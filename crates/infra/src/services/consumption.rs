//! Material consumption against appointments.
//!
//! Each operation decides on both aggregates from snapshots loaded in the same call and
//! appends the two batches in one atomic multi-stream commit, each with the version it was
//! decided on. Either the usage record and its movement both land, or neither does.
//!
//! Lookups check the referenced records first (unknown appointment, material or usage,
//! inactive material, closed appointment) and validate the quantity after that.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use clinicore_appointments::{
    self as appointments, Appointment, AppointmentCommand, AppointmentEvent, MaterialUsage,
    RecordUsage, ReviseUsage, RevokeUsage,
};
use clinicore_auth::{Permission, Principal};
use clinicore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, MovementId, Quantity, UsageId};
use clinicore_events::{EventBus, Subscription};
use clinicore_materials::{self as materials, Material, MaterialCommand, MovementKind, RecordMovement};

use super::{JsonEnvelope, require};
use crate::command_dispatcher::{CommandDispatcher, DispatchError, Loaded, stream_append};
use crate::event_store::EventStore;

const REVERSAL_NOTE: &str = "usage reversal";

/// usage → appointment lookup.
///
/// Seeded from the store on first use, then kept current from the bus subscription taken
/// when the recorder was built. Usage ids are never reused, so replaying the queued
/// events over the seed always converges.
#[derive(Debug)]
struct UsageIndex {
    updates: Subscription<JsonEnvelope>,
    owners: Option<HashMap<UsageId, AggregateId>>,
}

impl UsageIndex {
    fn apply(owners: &mut HashMap<UsageId, AggregateId>, envelope: JsonEnvelope) {
        if envelope.aggregate_type() != appointments::AGGREGATE_TYPE {
            return;
        }
        match serde_json::from_value::<AppointmentEvent>(envelope.into_payload()) {
            Ok(AppointmentEvent::UsageRecorded(e)) => {
                owners.insert(e.usage.usage_id, e.usage.appointment_id);
            }
            Ok(AppointmentEvent::UsageRevoked(e)) => {
                owners.remove(&e.usage_id);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "usage index skipped an undecodable event"),
        }
    }
}

/// Links material usage to appointments and keeps the stock ledger in step.
#[derive(Debug)]
pub struct ConsumptionRecorder<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    usage_index: Mutex<UsageIndex>,
}

impl<S, B> ConsumptionRecorder<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        let updates = dispatcher.bus().subscribe();
        Self {
            dispatcher,
            usage_index: Mutex::new(UsageIndex {
                updates,
                owners: None,
            }),
        }
    }

    /// Record consumption of `quantity` of a material during an appointment.
    ///
    /// The unit price is snapshotted from the material loaded in this call.
    pub fn add_usage(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
        material_id: AggregateId,
        quantity: Decimal,
        note: Option<String>,
    ) -> Result<MaterialUsage, DispatchError> {
        require(principal, &Permission::USAGES_WRITE)?;

        let appointment = self.load_appointment(appointment_id)?;
        let material = self.load_material(material_id)?;
        if !material.aggregate.is_active() {
            return Err(DomainError::MaterialInactive(material.aggregate.code().to_string()).into());
        }
        appointment.aggregate.ensure_open()?;
        let quantity = Quantity::new(quantity)?;

        let usage_id = UsageId::new();
        let now = Utc::now();

        let appointment_events = appointment.aggregate.handle(&AppointmentCommand::RecordUsage(
            RecordUsage {
                appointment_id,
                usage_id,
                material_id,
                quantity,
                unit_price: material.aggregate.unit_price(),
                note: note.clone(),
                actor_id: principal.actor_id,
                occurred_at: now,
            },
        ))?;

        let material_events = material
            .aggregate
            .handle(&MaterialCommand::Consume(RecordMovement {
                material_id,
                movement_id: MovementId::new(),
                kind: MovementKind::Out,
                quantity,
                actor_id: principal.actor_id,
                related_appointment_id: Some(appointment_id),
                related_usage_id: Some(usage_id),
                note,
                occurred_at: now,
            }))
            .inspect_err(|e| {
                if let DomainError::InsufficientStock { available, requested } = e {
                    warn!(%appointment_id, %material_id, %available, %requested, "usage rejected: insufficient stock");
                }
            })?;

        self.dispatcher.commit(vec![
            stream_append(appointment_id, appointments::AGGREGATE_TYPE, appointment.expected(), &appointment_events)?,
            stream_append(material_id, materials::AGGREGATE_TYPE, material.expected(), &material_events)?,
        ])?;

        let usage = appointment_events
            .into_iter()
            .find_map(|ev| match ev {
                AppointmentEvent::UsageRecorded(e) => Some(e.usage),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Integrity("usage command produced no usage".into()))?;

        info!(
            %appointment_id,
            %material_id,
            %usage_id,
            quantity = %usage.quantity,
            total_value = %usage.total_value,
            "material usage recorded"
        );
        Ok(usage)
    }

    /// Remove a usage record and return its quantity to stock (compensating `IN`).
    pub fn remove_usage(&self, principal: &Principal, usage_id: UsageId) -> Result<(), DispatchError> {
        require(principal, &Permission::USAGES_WRITE)?;

        let appointment = self.locate_usage(usage_id)?;
        let appointment_id = *appointment.aggregate.id();
        let appointment_events = appointment.aggregate.handle(&AppointmentCommand::RevokeUsage(
            RevokeUsage {
                appointment_id,
                usage_id,
                actor_id: principal.actor_id,
                occurred_at: Utc::now(),
            },
        ))?;

        let (material_id, quantity) = appointment_events
            .iter()
            .find_map(|ev| match ev {
                AppointmentEvent::UsageRevoked(e) => Some((e.material_id, e.quantity)),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Integrity("revoke produced no event".into()))?;

        let material = self.load_material(material_id)?;
        let material_events = material
            .aggregate
            .handle(&MaterialCommand::RecordMovement(RecordMovement {
                material_id,
                movement_id: MovementId::new(),
                kind: MovementKind::In,
                quantity,
                actor_id: principal.actor_id,
                related_appointment_id: Some(appointment_id),
                related_usage_id: Some(usage_id),
                note: Some(REVERSAL_NOTE.to_string()),
                occurred_at: Utc::now(),
            }))?;

        self.dispatcher.commit(vec![
            stream_append(appointment_id, appointments::AGGREGATE_TYPE, appointment.expected(), &appointment_events)?,
            stream_append(material_id, materials::AGGREGATE_TYPE, material.expected(), &material_events)?,
        ])?;

        info!(%appointment_id, %material_id, %usage_id, %quantity, "material usage removed");
        Ok(())
    }

    /// Change a usage's quantity, moving only the delta and re-snapshotting the price.
    pub fn update_usage_quantity(
        &self,
        principal: &Principal,
        usage_id: UsageId,
        new_quantity: Decimal,
    ) -> Result<MaterialUsage, DispatchError> {
        require(principal, &Permission::USAGES_WRITE)?;

        let appointment = self.locate_usage(usage_id)?;
        let appointment_id = *appointment.aggregate.id();
        let material_id = appointment
            .aggregate
            .usage(usage_id)
            .map(|u| u.material_id)
            .ok_or_else(|| DomainError::not_found("material usage", usage_id))?;
        let material = self.load_material(material_id)?;
        appointment.aggregate.ensure_open()?;
        let quantity = Quantity::new(new_quantity)?;
        let now = Utc::now();

        let appointment_events = appointment.aggregate.handle(&AppointmentCommand::ReviseUsage(
            ReviseUsage {
                appointment_id,
                usage_id,
                quantity,
                unit_price: material.aggregate.unit_price(),
                actor_id: principal.actor_id,
                occurred_at: now,
            },
        ))?;

        let previous = appointment_events
            .iter()
            .find_map(|ev| match ev {
                AppointmentEvent::UsageRevised(e) => Some(e.previous_quantity),
                _ => None,
            })
            .ok_or_else(|| DispatchError::Integrity("revise produced no event".into()))?;

        let delta = quantity.value() - previous.value();
        let mut batches = vec![stream_append(
            appointment_id,
            appointments::AGGREGATE_TYPE,
            appointment.expected(),
            &appointment_events,
        )?];

        if !delta.is_zero() {
            let kind = if delta > Decimal::ZERO {
                MovementKind::Out
            } else {
                MovementKind::In
            };
            let material_events = material
                .aggregate
                .handle(&MaterialCommand::RecordMovement(RecordMovement {
                    material_id,
                    movement_id: MovementId::new(),
                    kind,
                    quantity: Quantity::new(delta.abs())?,
                    actor_id: principal.actor_id,
                    related_appointment_id: Some(appointment_id),
                    related_usage_id: Some(usage_id),
                    note: Some(format!("usage quantity {previous} -> {quantity}")),
                    occurred_at: now,
                }))?;
            batches.push(stream_append(
                material_id,
                materials::AGGREGATE_TYPE,
                material.expected(),
                &material_events,
            )?);
        }

        self.dispatcher.commit(batches)?;

        let mut revised = appointment.aggregate;
        for ev in &appointment_events {
            revised.apply(ev);
        }
        let usage = revised
            .usage(usage_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("material usage", usage_id))?;

        info!(%appointment_id, %material_id, %usage_id, %previous, %quantity, "material usage revised");
        Ok(usage)
    }

    /// Usages currently recorded on an appointment, in recording order.
    pub fn list_usages(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
    ) -> Result<Vec<MaterialUsage>, DispatchError> {
        require(principal, &Permission::APPOINTMENTS_READ)?;
        Ok(self.load_appointment(appointment_id)?.aggregate.usages().to_vec())
    }

    fn load_appointment(&self, appointment_id: AggregateId) -> Result<Loaded<Appointment>, DispatchError> {
        let loaded = self.dispatcher.load(appointment_id, Appointment::empty)?;
        if !loaded.aggregate.exists() {
            return Err(DomainError::not_found("appointment", appointment_id).into());
        }
        Ok(loaded)
    }

    fn load_material(&self, material_id: AggregateId) -> Result<Loaded<Material>, DispatchError> {
        let loaded = self.dispatcher.load(material_id, Material::empty)?;
        if !loaded.aggregate.is_registered() {
            return Err(DomainError::not_found("material", material_id).into());
        }
        Ok(loaded)
    }

    /// Load the appointment that currently holds `usage_id`.
    fn locate_usage(&self, usage_id: UsageId) -> Result<Loaded<Appointment>, DispatchError> {
        let owner = self
            .owner_of(usage_id)?
            .ok_or_else(|| DomainError::not_found("material usage", usage_id))?;

        let loaded = self.load_appointment(owner)?;
        if loaded.aggregate.usage(usage_id).is_none() {
            return Err(DomainError::not_found("material usage", usage_id).into());
        }
        Ok(loaded)
    }

    fn owner_of(&self, usage_id: UsageId) -> Result<Option<AggregateId>, DispatchError> {
        let mut index = self
            .usage_index
            .lock()
            .map_err(|_| DispatchError::Integrity("usage index lock poisoned".into()))?;
        let UsageIndex { updates, owners } = &mut *index;

        if owners.is_none() {
            *owners = Some(self.seed_usage_index()?);
        }
        let owners = owners.get_or_insert_with(HashMap::new);
        while let Ok(envelope) = updates.try_recv() {
            UsageIndex::apply(owners, envelope);
        }
        Ok(owners.get(&usage_id).copied())
    }

    fn seed_usage_index(&self) -> Result<HashMap<UsageId, AggregateId>, DispatchError> {
        let owners: HashMap<UsageId, AggregateId> = self
            .dispatcher
            .load_all(appointments::AGGREGATE_TYPE, Appointment::empty)?
            .iter()
            .flat_map(|a| a.usages().iter().map(|u| (u.usage_id, u.appointment_id)))
            .collect();
        debug!(usages = owners.len(), "usage index seeded");
        Ok(owners)
    }
}
