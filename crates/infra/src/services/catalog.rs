use std::sync::{Arc, Mutex};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use clinicore_auth::{Permission, Principal};
use clinicore_core::{AggregateId, DomainError, MovementId};
use clinicore_events::EventBus;
use clinicore_materials::{
    AGGREGATE_TYPE, ActivateMaterial, DeactivateMaterial, Material, MaterialCommand,
    RegisterMaterial, RepriceMaterial,
};

use super::{JsonEnvelope, require};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

/// Input for registering a material in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMaterial {
    pub code: String,
    pub name: String,
    pub category: String,
    pub unit: String,
    pub description: Option<String>,
    pub min_stock: Decimal,
    pub unit_price: Decimal,
    pub opening_stock: Decimal,
}

/// Catalog administration and point reads of material state.
#[derive(Debug)]
pub struct MaterialCatalog<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    /// Serializes registrations so the code-uniqueness scan and the append are one step.
    registration: Mutex<()>,
}

impl<S, B> MaterialCatalog<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self {
            dispatcher,
            registration: Mutex::new(()),
        }
    }

    pub fn register(&self, principal: &Principal, input: NewMaterial) -> Result<Material, DispatchError> {
        require(principal, &Permission::MATERIALS_WRITE)?;

        let _guard = self
            .registration
            .lock()
            .map_err(|_| DispatchError::Integrity("registration lock poisoned".into()))?;

        let code = input.code.trim().to_ascii_uppercase();
        let taken = self
            .dispatcher
            .load_all(AGGREGATE_TYPE, Material::empty)?
            .iter()
            .any(|m| m.code() == code);
        if taken {
            return Err(DomainError::conflict(format!("material code '{code}' already in use")).into());
        }

        let material_id = AggregateId::new();
        let command = MaterialCommand::Register(RegisterMaterial {
            material_id,
            code: input.code,
            name: input.name,
            category: input.category,
            unit: input.unit,
            description: input.description,
            min_stock: input.min_stock,
            unit_price: input.unit_price,
            opening_stock: input.opening_stock,
            opening_movement_id: MovementId::new(),
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });

        let outcome = self
            .dispatcher
            .dispatch(material_id, AGGREGATE_TYPE, command, Material::empty)?;
        info!(%material_id, code = %outcome.aggregate.code(), "material registered");
        Ok(outcome.aggregate)
    }

    pub fn reprice(
        &self,
        principal: &Principal,
        material_id: AggregateId,
        unit_price: Decimal,
    ) -> Result<Material, DispatchError> {
        require(principal, &Permission::MATERIALS_WRITE)?;
        let command = MaterialCommand::Reprice(RepriceMaterial {
            material_id,
            unit_price,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });
        let outcome = self
            .dispatcher
            .dispatch(material_id, AGGREGATE_TYPE, command, Material::empty)?;
        info!(%material_id, unit_price = %outcome.aggregate.unit_price(), "material repriced");
        Ok(outcome.aggregate)
    }

    pub fn deactivate(&self, principal: &Principal, material_id: AggregateId) -> Result<Material, DispatchError> {
        require(principal, &Permission::MATERIALS_WRITE)?;
        let command = MaterialCommand::Deactivate(DeactivateMaterial {
            material_id,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });
        let outcome = self
            .dispatcher
            .dispatch(material_id, AGGREGATE_TYPE, command, Material::empty)?;
        info!(%material_id, "material deactivated");
        Ok(outcome.aggregate)
    }

    pub fn activate(&self, principal: &Principal, material_id: AggregateId) -> Result<Material, DispatchError> {
        require(principal, &Permission::MATERIALS_WRITE)?;
        let command = MaterialCommand::Activate(ActivateMaterial {
            material_id,
            actor_id: principal.actor_id,
            occurred_at: Utc::now(),
        });
        let outcome = self
            .dispatcher
            .dispatch(material_id, AGGREGATE_TYPE, command, Material::empty)?;
        info!(%material_id, "material activated");
        Ok(outcome.aggregate)
    }

    pub fn get(&self, principal: &Principal, material_id: AggregateId) -> Result<Material, DispatchError> {
        require(principal, &Permission::MATERIALS_READ)?;
        let loaded = self.dispatcher.load(material_id, Material::empty)?;
        if !loaded.aggregate.is_registered() {
            return Err(DomainError::not_found("material", material_id).into());
        }
        Ok(loaded.aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Fixture, admin, dec, new_material, receptionist};
    use clinicore_core::AggregateRoot;

    #[test]
    fn duplicate_codes_are_rejected_case_insensitively() {
        let fx = Fixture::new();
        let catalog = MaterialCatalog::new(fx.dispatcher.clone());
        catalog
            .register(&admin(), new_material("RES-A2", "10", "0"))
            .unwrap();

        let err = catalog
            .register(&admin(), new_material(" res-a2 ", "12", "0"))
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn opening_stock_is_recorded_in_the_same_commit() {
        let fx = Fixture::new();
        let catalog = MaterialCatalog::new(fx.dispatcher.clone());
        let m = catalog
            .register(&receptionist(), new_material("AN-02", "4.20", "25"))
            .unwrap();

        assert_eq!(m.stock(), dec("25"));
        assert_eq!(m.version(), 2);
        assert_eq!(fx.store.load_stream(*m.id()).unwrap().len(), 2);
    }

    #[test]
    fn reprice_and_activation_round_trip() {
        let fx = Fixture::new();
        let catalog = MaterialCatalog::new(fx.dispatcher.clone());
        let id = *catalog
            .register(&admin(), new_material("SUT-4", "3", "0"))
            .unwrap()
            .id();

        let m = catalog.reprice(&admin(), id, dec("3.75")).unwrap();
        assert_eq!(m.unit_price().amount(), dec("3.75"));

        assert!(!catalog.deactivate(&admin(), id).unwrap().is_active());
        let err = catalog.deactivate(&admin(), id).unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidArgument(_))));
        assert!(catalog.activate(&admin(), id).unwrap().is_active());
    }

    #[test]
    fn get_unknown_material_is_not_found() {
        let fx = Fixture::new();
        let catalog = MaterialCatalog::new(fx.dispatcher.clone());
        let err = catalog.get(&admin(), AggregateId::new()).unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::NotFound { entity: "material", .. })
        ));
    }
}
