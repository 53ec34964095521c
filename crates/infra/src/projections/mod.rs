//! Projections (read model builders).
//!
//! Projections consume published envelopes and are:
//! - **Rebuildable** from the event store
//! - **Idempotent** under at-least-once delivery (per-stream cursors)

pub mod material_stock;

pub use material_stock::{MaterialProjectionError, MaterialStockProjection, MaterialStockView};
