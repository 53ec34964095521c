//! Append-only event store boundary.
//!
//! Streams are keyed by aggregate id. Only an in-memory backend ships with the workspace.

pub mod in_memory;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use query::{Page, Pagination};
pub use r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
