//! Infrastructure layer: event store, dispatcher, application services, projections.

use std::sync::Arc;

use clinicore_events::InMemoryEventBus;

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod services;
pub mod workers;

#[cfg(test)]
mod test_support;

/// Dispatcher wired to the in-memory store and bus (tests and the single-process server).
pub type InMemoryDispatcher = command_dispatcher::CommandDispatcher<
    Arc<event_store::InMemoryEventStore>,
    Arc<InMemoryEventBus<services::JsonEnvelope>>,
>;
