//! Material catalog and stock ledger (event-sourced).
//!
//! A material's stream is its movement log: every stock change is a `StockMoved` event
//! carrying the previous and resulting stock, so the current level is always the fold of
//! the stream. Pure domain logic only (no IO, no HTTP, no storage).

pub mod material;
pub mod movement;

pub use material::{
    ActivateMaterial, DeactivateMaterial, Material, MaterialActivated, MaterialCommand,
    MaterialDeactivated, MaterialEvent, MaterialRegistered, MaterialRepriced, RecordMovement,
    RegisterMaterial, RepriceMaterial,
};
pub use movement::{AdjustDirection, MovementKind, StockMovement};

/// Aggregate type tag used for material streams.
pub const AGGREGATE_TYPE: &str = "materials.material";
