//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes committed events to consumers such as the low-stock projection.
//! The event store stays the source of truth:
//!
//! - events are published only after a successful append
//! - delivery is at-least-once, so consumers must be idempotent
//! - ordering is guaranteed per publisher only

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use crate::EventEnvelope;

/// A subscription to the bus. Each subscription receives a copy of every published message.
///
/// Intended for a single consuming thread (see the infra projection worker).
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic pub/sub bus.
///
/// ```text
/// Command → EventStore::append → EventBus::publish → projections / workers
/// ```
///
/// `publish()` failures are surfaced to the caller (the dispatcher). Since the events are
/// already persisted at that point, republishing is safe.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

/// Messages that belong to a typed aggregate stream.
///
/// Workers use this to skip streams they do not care about (e.g. the material projection
/// ignores appointment events).
pub trait StreamScoped {
    fn aggregate_type(&self) -> &str;
}

impl<E> StreamScoped for EventEnvelope<E> {
    fn aggregate_type(&self) -> &str {
        EventEnvelope::aggregate_type(self)
    }
}
