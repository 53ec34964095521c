use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use clinicore_core::{AggregateId, Money};
use clinicore_events::EventEnvelope;
use clinicore_materials::{AGGREGATE_TYPE, MaterialEvent};

use crate::read_model::ReadStore;

/// Queryable material read model: catalog fields plus current stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialStockView {
    pub material_id: AggregateId,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub stock: Decimal,
    pub min_stock: Decimal,
    pub unit_price: Money,
    pub active: bool,
}

impl MaterialStockView {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

#[derive(Debug, Error)]
pub enum MaterialProjectionError {
    #[error("failed to deserialize material event: {0}")]
    Deserialize(String),

    #[error("event material_id does not match envelope aggregate_id")]
    StreamMismatch,

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("projection cursor lock poisoned")]
    Poisoned,
}

/// Low-stock projection.
///
/// Consumes published envelopes and keeps one view per material. Envelopes from other
/// aggregate types are ignored. Replays at or below the stream cursor are no-ops.
#[derive(Debug)]
pub struct MaterialStockProjection<S>
where
    S: ReadStore<AggregateId, MaterialStockView>,
{
    store: S,
    cursors: RwLock<HashMap<AggregateId, u64>>,
}

impl<S> MaterialStockProjection<S>
where
    S: ReadStore<AggregateId, MaterialStockView>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, material_id: &AggregateId) -> Option<MaterialStockView> {
        self.store.get(material_id)
    }

    /// All materials, ordered by code.
    pub fn list(&self) -> Vec<MaterialStockView> {
        let mut all = self.store.list();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        all
    }

    /// Active materials at or below their minimum stock, ordered by code.
    pub fn low_stock(&self) -> Vec<MaterialStockView> {
        self.list()
            .into_iter()
            .filter(|v| v.active && v.is_low_stock())
            .collect()
    }

    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), MaterialProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| MaterialProjectionError::Poisoned)?;
        let last = cursors.get(&aggregate_id).copied().unwrap_or(0);

        if seq == 0 {
            return Err(MaterialProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(());
        }
        if seq != last + 1 {
            return Err(MaterialProjectionError::NonMonotonicSequence { last, found: seq });
        }

        let event: MaterialEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| MaterialProjectionError::Deserialize(e.to_string()))?;

        let event_material = match &event {
            MaterialEvent::Registered(e) => e.material_id,
            MaterialEvent::Repriced(e) => e.material_id,
            MaterialEvent::Deactivated(e) => e.material_id,
            MaterialEvent::Activated(e) => e.material_id,
            MaterialEvent::StockMoved(e) => e.material_id,
        };
        if event_material != aggregate_id {
            return Err(MaterialProjectionError::StreamMismatch);
        }

        match event {
            MaterialEvent::Registered(e) => {
                self.store.upsert(
                    aggregate_id,
                    MaterialStockView {
                        material_id: aggregate_id,
                        code: e.code,
                        name: e.name,
                        unit: e.unit,
                        stock: Decimal::ZERO,
                        min_stock: e.min_stock,
                        unit_price: e.unit_price,
                        active: true,
                    },
                );
            }
            other => {
                if let Some(mut view) = self.store.get(&aggregate_id) {
                    match other {
                        MaterialEvent::Repriced(e) => view.unit_price = e.unit_price,
                        MaterialEvent::Deactivated(_) => view.active = false,
                        MaterialEvent::Activated(_) => view.active = true,
                        MaterialEvent::StockMoved(m) => view.stock = m.resulting_stock,
                        MaterialEvent::Registered(_) => {}
                    }
                    self.store.upsert(aggregate_id, view);
                }
            }
        }

        cursors.insert(aggregate_id, seq);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), MaterialProjectionError> {
        self.cursors
            .write()
            .map_err(|_| MaterialProjectionError::Poisoned)?
            .clear();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
