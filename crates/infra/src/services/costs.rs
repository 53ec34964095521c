use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use clinicore_appointments::{AGGREGATE_TYPE, Appointment, MaterialUsage};
use clinicore_auth::{Permission, Principal};
use clinicore_core::{AggregateId, DateRange, DomainError, Money};
use clinicore_events::EventBus;

use super::{JsonEnvelope, require};
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;

/// Consumption totals over a period, optionally for one material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumptionSummary {
    pub total_value: Money,
    /// Only meaningful for a single material (units differ across materials).
    pub total_quantity: Option<Decimal>,
    pub usage_count: usize,
}

/// Read-only cost rollups over recorded usages.
///
/// Values come from the price snapshotted on each usage, so repricing a material never
/// changes a past cost.
#[derive(Debug)]
pub struct CostAggregator<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
}

impl<S, B> CostAggregator<S, B>
where
    S: EventStore,
    B: EventBus<JsonEnvelope>,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>) -> Self {
        Self { dispatcher }
    }

    pub fn total_material_cost(
        &self,
        principal: &Principal,
        appointment_id: AggregateId,
    ) -> Result<Money, DispatchError> {
        require(principal, &Permission::APPOINTMENTS_READ)?;
        let loaded = self.dispatcher.load(appointment_id, Appointment::empty)?;
        if !loaded.aggregate.exists() {
            return Err(DomainError::not_found("appointment", appointment_id).into());
        }
        Ok(loaded.aggregate.material_cost()?)
    }

    pub fn total_consumed_value(
        &self,
        principal: &Principal,
        range: DateRange,
        material_id: Option<AggregateId>,
    ) -> Result<Money, DispatchError> {
        Ok(self.summary(principal, range, material_id)?.total_value)
    }

    pub fn total_consumed_quantity(
        &self,
        principal: &Principal,
        material_id: AggregateId,
        range: DateRange,
    ) -> Result<Decimal, DispatchError> {
        let summary = self.summary(principal, range, Some(material_id))?;
        Ok(summary.total_quantity.unwrap_or(Decimal::ZERO))
    }

    /// Usages whose `recorded_at` lies in `range`, oldest first.
    pub fn usages(
        &self,
        principal: &Principal,
        range: DateRange,
        material_id: Option<AggregateId>,
    ) -> Result<Vec<MaterialUsage>, DispatchError> {
        require(principal, &Permission::REPORTS_READ)?;

        let appointments = self.dispatcher.load_all(AGGREGATE_TYPE, Appointment::empty)?;
        let mut matching: Vec<MaterialUsage> = appointments
            .iter()
            .flat_map(|a| a.usages())
            .filter(|u| range.contains(u.recorded_at))
            .filter(|u| material_id.is_none_or(|m| u.material_id == m))
            .cloned()
            .collect();
        matching.sort_by_key(|u| u.recorded_at);
        debug!(
            appointments = appointments.len(),
            usages = matching.len(),
            "usages selected"
        );
        Ok(matching)
    }

    pub fn summary(
        &self,
        principal: &Principal,
        range: DateRange,
        material_id: Option<AggregateId>,
    ) -> Result<ConsumptionSummary, DispatchError> {
        let matching = self.usages(principal, range, material_id)?;

        let total_quantity = match material_id {
            Some(_) => Some(
                matching
                    .iter()
                    .try_fold(Decimal::ZERO, |acc, u| acc.checked_add(u.quantity.value()))
                    .ok_or_else(|| DomainError::invalid("consumed quantity out of range"))?,
            ),
            None => None,
        };

        Ok(ConsumptionSummary {
            total_value: Money::total(matching.iter().map(|u| u.total_value))?,
            total_quantity,
            usage_count: matching.len(),
        })
    }
}
