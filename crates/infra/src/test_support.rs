//! Shared fixtures for unit and integration tests.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use clinicore_auth::{ClinicRolePolicy, Principal, Role};
use clinicore_core::{ActorId, DentistId, PatientId};
use clinicore_events::InMemoryEventBus;

use crate::InMemoryDispatcher;
use crate::event_store::InMemoryEventStore;
use crate::services::{JsonEnvelope, NewAppointment, NewMaterial};

pub struct Fixture {
    pub store: Arc<InMemoryEventStore>,
    pub bus: Arc<InMemoryEventBus<JsonEnvelope>>,
    pub dispatcher: Arc<InMemoryDispatcher>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(InMemoryDispatcher::new(store.clone(), bus.clone()));
        Self {
            store,
            bus,
            dispatcher,
        }
    }
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn principal(roles: &[Role]) -> Principal {
    Principal::resolve(ActorId::new(), roles.to_vec(), &ClinicRolePolicy)
}

pub fn admin() -> Principal {
    principal(&[Role::ADMIN])
}

pub fn receptionist() -> Principal {
    principal(&[Role::RECEPTIONIST])
}

pub fn dentist() -> Principal {
    principal(&[Role::DENTIST])
}

pub fn nobody() -> Principal {
    principal(&[])
}

/// Material with `min_stock` 5.
pub fn new_material(code: &str, unit_price: &str, opening_stock: &str) -> NewMaterial {
    NewMaterial {
        code: code.to_string(),
        name: format!("Material {code}"),
        category: "consumables".to_string(),
        unit: "un".to_string(),
        description: None,
        min_stock: dec("5"),
        unit_price: dec(unit_price),
        opening_stock: dec(opening_stock),
    }
}

pub fn new_appointment() -> NewAppointment {
    NewAppointment {
        patient_id: PatientId::new(),
        dentist_id: DentistId::new(),
        scheduled_at: Utc::now() + Duration::days(1),
        procedure: "Composite filling".to_string(),
        declared_value: Some(dec("180.00")),
        notes: None,
    }
}
