//! An event-sourced aggregate engine with declarative state machines.
//!
//! Records managed through this engine are never overwritten in place: every
//! change is an immutable, sequence-numbered event appended to a per-aggregate
//! log, and every change must follow a transition declared in the aggregate's
//! [`StateMachine`]. Current state is always the deterministic fold of the log.
//!
//! The moving parts, wired together by an [`AggregateManager`]:
//!
//! - [`StateMachine`] - the validated, immutable transition table built once at
//!   startup via [`StateMachineBuilder`].
//! - [`EventStore`] - append-only storage with compare-and-swap semantics on
//!   the expected version. [`InMemoryStore`] is the reference implementation.
//! - [`AggregateManager`] - routes a [`CommandEnvelope`] through load, resolve,
//!   capability check and CAS append, then notifies handlers and buses.
//! - [`Projector`] - folds committed events into queryable [`Projection`]s,
//!   idempotently, and can rebuild them from scratch by replay.
//! - [`BroadcastEventBus`] - in-process fan-out of committed events to
//!   external subscribers.

mod aggregate;
mod command;
mod error;
mod event;
mod handler;
mod identity;
mod machine;
mod state;
mod types;

pub mod bus;
pub mod manager;
pub mod query;
pub mod store;

pub use crate::aggregate::Aggregate;
pub use crate::bus::channel::BroadcastEventBus;
pub use crate::bus::EventBus;
pub use crate::command::{Command, CommandEnvelope};
pub use crate::error::{CorruptStream, EngineError};
pub use crate::event::{Event, Upcaster};
pub use crate::handler::{EventHandler, ReplayableEventHandler};
pub use crate::identity::{Capability, Identity};
pub use crate::machine::{MachineDefError, StateMachine, StateMachineBuilder, Transition};
pub use crate::manager::{AggregateManager, RetryPolicy};
pub use crate::query::{InMemoryProjections, Projection, ProjectionError, ProjectionStore, Projector};
pub use crate::state::AggregateState;
pub use crate::store::memory::InMemoryStore;
pub use crate::store::{EventStore, EventStoreError, StoreEvent};
pub use crate::types::SequenceNumber;
