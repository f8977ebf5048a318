use std::ops::Deref;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::types::SequenceNumber;

pub mod memory;

/// Failures at the storage boundary.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Another event already occupies `(aggregate_id, expected + 1)`. The
    /// append committed nothing.
    #[error("version conflict on aggregate {aggregate_id}: expected version {expected}, stream is at {actual}")]
    VersionConflict {
        aggregate_id: Uuid,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },

    /// An event payload failed to encode or decode.
    #[error("event payload could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),

    /// Transient infrastructure failure; the operation may be retried with
    /// backoff.
    #[error("event store unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// The contract the engine requires from a backing store, whatever the
/// implementation: an append-only, per-aggregate sequential log. There is no
/// update and no delete - events are retained forever.
#[async_trait]
pub trait EventStore<A>: Send + Sync
where
    A: Aggregate,
{
    /// Appends one event under compare-and-swap semantics keyed on
    /// `(aggregate_id, expected_version)`.
    ///
    /// The append must be atomic: it must never commit two events at the same
    /// `(aggregate_id, version + 1)`. When the stream is not exactly at
    /// `expected_version` the call fails with
    /// [`EventStoreError::VersionConflict`] and commits nothing.
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: SequenceNumber,
        event: A::Event,
        causation_id: Uuid,
    ) -> Result<StoreEvent<A::Event>, EventStoreError>;

    /// Reads the events of one aggregate from `from_sequence` (inclusive)
    /// upward, in sequence order: never reordered, never skipping, never
    /// returning a partially written event. `from_sequence = 1` reads the
    /// full history.
    async fn read(
        &self,
        aggregate_id: Uuid,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<StoreEvent<A::Event>>, EventStoreError>;

    /// Streams the full store content, ordered by sequence number within each
    /// aggregate. This is mainly used to rebuild read models.
    fn stream_all(&self) -> BoxStream<'_, Result<StoreEvent<A::Event>, EventStoreError>>;
}

/// Blanket implementation making an [`EventStore`] of every (smart) pointer
/// to an [`EventStore`], e.g. `&Store`, `Box<Store>`, `Arc<Store>`. Useful
/// when a store is shared between a manager and a projector.
#[async_trait]
impl<A, S, T> EventStore<A> for T
where
    A: Aggregate,
    S: EventStore<A> + ?Sized + 'static,
    T: Deref<Target = S> + Send + Sync,
{
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: SequenceNumber,
        event: A::Event,
        causation_id: Uuid,
    ) -> Result<StoreEvent<A::Event>, EventStoreError> {
        self.deref().append(aggregate_id, expected_version, event, causation_id).await
    }

    async fn read(
        &self,
        aggregate_id: Uuid,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<StoreEvent<A::Event>>, EventStoreError> {
        self.deref().read(aggregate_id, from_sequence).await
    }

    fn stream_all(&self) -> BoxStream<'_, Result<StoreEvent<A::Event>, EventStoreError>> {
        self.deref().stream_all()
    }
}

/// A committed event: the domain payload alongside the metadata recorded at
/// append time. Immutable once committed.
#[derive(Debug)]
pub struct StoreEvent<Event> {
    /// Uniquely identifies this event among all events of all aggregates.
    pub id: Uuid,
    /// The aggregate instance this event belongs to.
    pub aggregate_id: Uuid,
    /// The original, committed, domain event.
    pub payload: Event,
    /// When the event was committed.
    pub occurred_on: DateTime<Utc>,
    /// Position within the aggregate's log; the first event carries 1.
    pub sequence_number: SequenceNumber,
    /// Schema version of the payload, fed back to the upcaster on read.
    pub version: Option<i32>,
    /// The command that caused this event.
    pub causation_id: Uuid,
}

impl<Event> StoreEvent<Event> {
    pub const fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    pub const fn payload(&self) -> &Event {
        &self.payload
    }

    /// Commit timestamp as epoch milliseconds, for wire layouts that do not
    /// carry structured timestamps.
    pub fn occurred_on_millis(&self) -> i64 {
        self.occurred_on.timestamp_millis()
    }
}

impl<Event: Clone> Clone for StoreEvent<Event> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            aggregate_id: self.aggregate_id,
            payload: self.payload.clone(),
            occurred_on: self.occurred_on,
            sequence_number: self.sequence_number,
            version: self.version,
            causation_id: self.causation_id,
        }
    }
}
