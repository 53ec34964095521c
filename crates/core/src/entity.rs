//! Entities: identity that survives state changes inside an aggregate.

/// Entity owned by an aggregate (e.g. a material usage inside an appointment).
///
/// Entities are never addressed on their own stream; they are created, changed and removed
/// only through events of their owning aggregate.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
