use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use clinicore_core::{ActorId, AggregateId, DomainResult, Entity, Money, Quantity, UsageId};

/// A material consumed during an appointment, priced at the time of use.
///
/// `total_value` is always `quantity × unit_price_at_use`; the two are only ever rewritten
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub usage_id: UsageId,
    pub appointment_id: AggregateId,
    pub material_id: AggregateId,
    pub quantity: Quantity,
    pub unit_price_at_use: Money,
    pub total_value: Money,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub recorded_by: ActorId,
    pub revised_at: Option<DateTime<Utc>>,
}

impl MaterialUsage {
    pub fn priced(quantity: Quantity, unit_price: Money) -> DomainResult<Money> {
        unit_price.times(quantity)
    }
}

impl Entity for MaterialUsage {
    type Id = UsageId;

    fn id(&self) -> &Self::Id {
        &self.usage_id
    }
}
