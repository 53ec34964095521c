//! Event mechanics shared by the clinic aggregates and the infrastructure layer.
//!
//! Pure contracts only: the event trait, the published envelope, the pub/sub bus and a
//! deterministic in-place command executor. Nothing here performs IO.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;

pub use bus::{EventBus, StreamScoped, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
