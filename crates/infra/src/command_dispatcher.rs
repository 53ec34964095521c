//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load the stream and check its integrity
//!   ↓
//! 2. Rehydrate the aggregate
//!   ↓
//! 3. Handle the command (pure decision, produces events)
//!   ↓
//! 4. Append with `ExpectedVersion::Exact(loaded version)`
//!   ↓
//! 5. Publish committed envelopes to the bus
//! ```
//!
//! Operations that touch two aggregates (recording consumption touches an appointment and a
//! material) use [`CommandDispatcher::load`] for each side, decide both, and then hand both
//! batches to [`CommandDispatcher::commit`], which appends them in one atomic unit.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use clinicore_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ExpectedVersion};
use clinicore_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic business rejection (including optimistic concurrency conflicts).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A loaded stream is out of order or belongs to another aggregate.
    #[error("stream integrity violation: {0}")]
    Integrity(String),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Persisting to the event store failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// Publication failed after a successful append (at-least-once; the events are stored).
    #[error("publish failed after commit: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Domain(DomainError::Conflict(msg)),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    /// The domain rejection, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// A rehydrated aggregate together with the stream version it was loaded at.
#[derive(Debug, Clone)]
pub struct Loaded<A> {
    pub aggregate: A,
    pub version: u64,
}

impl<A> Loaded<A> {
    /// Expectation to use when appending decisions made from this snapshot.
    pub fn expected(&self) -> ExpectedVersion {
        ExpectedVersion::Exact(self.version)
    }
}

/// Outcome of a single-aggregate dispatch: the post-command state and what was stored.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub aggregate: A,
    pub events: Vec<A::Event>,
    pub committed: Vec<StoredEvent>,
}

/// Build a stream batch from typed domain events.
pub fn stream_append<E>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    expected_version: ExpectedVersion,
    events: &[E],
) -> Result<StreamAppend, DispatchError>
where
    E: clinicore_events::Event + Serialize,
{
    let events = events
        .iter()
        .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(StreamAppend {
        aggregate_id,
        expected_version,
        events,
    })
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store and the bus so tests and the API server share the same code
/// with in-memory backends.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and rehydrate an aggregate. A missing stream yields `make_aggregate(id)` at version 0.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Loaded<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        Ok(Loaded {
            aggregate,
            version: stream_version(&history),
        })
    }

    /// Dispatch a command against a single aggregate stream.
    ///
    /// A command that decides no events (an idempotent no-op) returns the loaded state and
    /// an empty `committed` list without touching the store.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError, Id = AggregateId>,
        A::Event: clinicore_events::Event + Serialize + DeserializeOwned,
    {
        let loaded = self.load(aggregate_id, make_aggregate)?;
        self.decide_and_commit(loaded, aggregate_type, &command)
    }

    /// Handle `command` against an already loaded snapshot and append with its version.
    ///
    /// Used when the caller must inspect state (existence, permissions) before deciding.
    pub fn decide_and_commit<A>(
        &self,
        loaded: Loaded<A>,
        aggregate_type: &str,
        command: &A::Command,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError, Id = AggregateId>,
        A::Event: clinicore_events::Event + Serialize,
    {
        let expected = loaded.expected();
        let mut aggregate = loaded.aggregate;
        let aggregate_id = *aggregate.id();

        let events = aggregate.handle(command)?;
        if events.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events,
                committed: vec![],
            });
        }

        let batch = stream_append(aggregate_id, aggregate_type, expected, &events)?;
        let committed = self.commit(vec![batch])?;

        for ev in &events {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            aggregate,
            events,
            committed,
        })
    }

    /// Rehydrate every stream of one aggregate type (report scans, uniqueness checks).
    pub fn load_all<A>(
        &self,
        aggregate_type: &str,
        make_aggregate: impl Fn(AggregateId) -> A,
    ) -> Result<Vec<A>, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let events = self.store.load_by_aggregate_type(aggregate_type)?;

        let mut out = Vec::new();
        for stream in events.chunk_by(|a, b| a.aggregate_id == b.aggregate_id) {
            let aggregate_id = stream[0].aggregate_id;
            validate_loaded_stream(aggregate_id, stream)?;
            let mut aggregate = make_aggregate(aggregate_id);
            apply_history(&mut aggregate, stream)?;
            out.push(aggregate);
        }
        Ok(out)
    }

    /// Append one or more stream batches atomically, then publish the committed events.
    pub fn commit(&self, appends: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.store.append_streams(appends)?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Integrity(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number != last + 1 {
            return Err(DispatchError::Integrity(format!(
                "sequence gap in stream {aggregate_id} (last={last}, found={})",
                e.sequence_number
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use clinicore_core::{ActorId, DentistId, PatientId};
    use clinicore_appointments::{
        AGGREGATE_TYPE, Appointment, AppointmentCommand, AppointmentStatus, ChangeStatus,
        ScheduleAppointment,
    };
    use clinicore_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;

    type Dispatcher =
        CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    fn dispatcher() -> Dispatcher {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn schedule(id: AggregateId) -> AppointmentCommand {
        AppointmentCommand::Schedule(ScheduleAppointment {
            appointment_id: id,
            patient_id: PatientId::new(),
            dentist_id: DentistId::new(),
            scheduled_at: Utc::now(),
            procedure: "Extraction".to_string(),
            declared_value: None,
            notes: None,
            actor_id: ActorId::new(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_persists_publishes_and_returns_new_state() {
        let d = dispatcher();
        let sub = d.bus().subscribe();
        let id = AggregateId::new();

        let out = d
            .dispatch(id, AGGREGATE_TYPE, schedule(id), Appointment::empty)
            .unwrap();
        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.aggregate.version(), 1);
        assert!(out.aggregate.exists());

        let env = sub.try_recv().unwrap();
        assert_eq!(env.aggregate_id(), id);
        assert_eq!(env.sequence_number(), 1);
        assert_eq!(env.event_type(), "appointments.appointment.scheduled");
    }

    #[test]
    fn load_rehydrates_from_history() {
        let d = dispatcher();
        let id = AggregateId::new();
        d.dispatch(id, AGGREGATE_TYPE, schedule(id), Appointment::empty)
            .unwrap();
        d.dispatch(
            id,
            AGGREGATE_TYPE,
            AppointmentCommand::ChangeStatus(ChangeStatus {
                appointment_id: id,
                target: AppointmentStatus::Confirmed,
                actor_id: ActorId::new(),
                occurred_at: Utc::now(),
            }),
            Appointment::empty,
        )
        .unwrap();

        let loaded = d.load(id, Appointment::empty).unwrap();
        assert_eq!(loaded.version, 2);
        assert_eq!(loaded.aggregate.status(), AppointmentStatus::Confirmed);
    }

    #[test]
    fn domain_rejection_writes_nothing() {
        let d = dispatcher();
        let id = AggregateId::new();
        let err = d
            .dispatch(
                id,
                AGGREGATE_TYPE,
                AppointmentCommand::ChangeStatus(ChangeStatus {
                    appointment_id: id,
                    target: AppointmentStatus::Confirmed,
                    actor_id: ActorId::new(),
                    occurred_at: Utc::now(),
                }),
                Appointment::empty,
            )
            .unwrap_err();

        assert!(matches!(
            err.domain(),
            Some(DomainError::NotFound { entity: "appointment", .. })
        ));
        assert!(d.store().load_stream(id).unwrap().is_empty());
    }

    #[test]
    fn stale_commit_surfaces_as_conflict() {
        let d = dispatcher();
        let id = AggregateId::new();
        let stale = d.load(id, Appointment::empty).unwrap();
        let events = stale.aggregate.handle(&schedule(id)).unwrap();

        d.dispatch(id, AGGREGATE_TYPE, schedule(id), Appointment::empty)
            .unwrap();

        let batch = stream_append(id, AGGREGATE_TYPE, stale.expected(), &events).unwrap();
        let err = d.commit(vec![batch]).unwrap_err();
        assert!(matches!(err, DispatchError::Domain(DomainError::Conflict(_))));
    }
}
