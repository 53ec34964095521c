//! `clinicore-core` — domain foundation building blocks.
//!
//! Pure domain primitives shared by the appointment and material aggregates (no IO).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{ActorId, AggregateId, DentistId, MovementId, PatientId, UsageId};
pub use value_object::{DateRange, Money, Quantity, ValueObject};
