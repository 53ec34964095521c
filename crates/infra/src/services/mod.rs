//! Application services: permission checks, cross-aggregate orchestration and reads.
//!
//! Every service shares one [`CommandDispatcher`] so all writes go through the same store
//! and bus. Services never retry; a `Conflict` is returned to the caller as-is.

pub mod catalog;
pub mod consumption;
pub mod costs;
pub mod stock_ledger;
pub mod workflow;

pub use catalog::{MaterialCatalog, NewMaterial};
pub use consumption::ConsumptionRecorder;
pub use costs::{ConsumptionSummary, CostAggregator};
pub use stock_ledger::{MovementRequest, StockLedger};
pub use workflow::{AppointmentWorkflow, NewAppointment};

use serde_json::Value as JsonValue;

use clinicore_auth::{Permission, Principal, authorize};
use clinicore_events::EventEnvelope;

use crate::command_dispatcher::DispatchError;

/// Envelope type carried on the bus.
pub type JsonEnvelope = EventEnvelope<JsonValue>;

pub(crate) fn require(principal: &Principal, permission: &Permission) -> Result<(), DispatchError> {
    authorize(principal, permission).map_err(|e| DispatchError::Domain(e.into()))
}
