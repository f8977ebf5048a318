use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::event::Upcaster;
use crate::store::{EventStore, EventStoreError, StoreEvent};
use crate::types::SequenceNumber;

/// What is kept per committed event. The sequence number is implicit: the
/// record at index `n` of a stream carries sequence number `n + 1`.
struct Record {
    id: Uuid,
    payload: serde_json::Value,
    occurred_on: DateTime<Utc>,
    version: Option<i32>,
    causation_id: Uuid,
}

/// Reference in-memory [`EventStore`]. The compare-and-swap decision happens
/// under the write lock, so exactly one writer can commit at a given
/// `(aggregate_id, version)` - the same guarantee a persistent adapter gets
/// from a unique `(aggregate_id, sequence_number)` index.
///
/// Payloads are stored serialized and go through [`Upcaster::upcast`] on
/// read, so this store exercises the same evolution path a persistent
/// adapter would.
///
/// The store is wrapped in an [`Arc`] and can be cloned cheaply while still
/// referring to the same log.
pub struct InMemoryStore<A>
where
    A: Aggregate,
{
    inner: Arc<RwLock<HashMap<Uuid, Vec<Record>>>>,
    _aggregate: PhantomData<A>,
}

impl<A> InMemoryStore<A>
where
    A: Aggregate,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            _aggregate: PhantomData,
        }
    }

    fn decode(
        aggregate_id: Uuid,
        sequence_number: SequenceNumber,
        record: &Record,
    ) -> Result<StoreEvent<A::Event>, EventStoreError> {
        let payload = A::Event::upcast(record.payload.clone(), record.version)?;

        Ok(StoreEvent {
            id: record.id,
            aggregate_id,
            payload,
            occurred_on: record.occurred_on,
            sequence_number,
            version: record.version,
            causation_id: record.causation_id,
        })
    }
}

impl<A> Default for InMemoryStore<A>
where
    A: Aggregate,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for InMemoryStore<A>
where
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _aggregate: PhantomData,
        }
    }
}

#[async_trait::async_trait]
impl<A> EventStore<A> for InMemoryStore<A>
where
    A: Aggregate,
{
    async fn append(
        &self,
        aggregate_id: Uuid,
        expected_version: SequenceNumber,
        event: A::Event,
        causation_id: Uuid,
    ) -> Result<StoreEvent<A::Event>, EventStoreError> {
        let payload = serde_json::to_value(&event)?;

        let mut guard = self.inner.write().await;
        let stream = guard.entry(aggregate_id).or_default();

        let actual = stream.len() as SequenceNumber;
        if actual != expected_version {
            return Err(EventStoreError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        let record = Record {
            id: Uuid::new_v4(),
            payload,
            occurred_on: Utc::now(),
            version: A::Event::current_version(),
            causation_id,
        };

        let store_event = StoreEvent {
            id: record.id,
            aggregate_id,
            payload: event,
            occurred_on: record.occurred_on,
            sequence_number: actual + 1,
            version: record.version,
            causation_id,
        };

        stream.push(record);

        Ok(store_event)
    }

    async fn read(
        &self,
        aggregate_id: Uuid,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<StoreEvent<A::Event>>, EventStoreError> {
        let guard = self.inner.read().await;

        let Some(stream) = guard.get(&aggregate_id) else {
            return Ok(vec![]);
        };

        stream
            .iter()
            .enumerate()
            .skip(from_sequence.saturating_sub(1) as usize)
            .map(|(index, record)| Self::decode(aggregate_id, index as SequenceNumber + 1, record))
            .collect()
    }

    fn stream_all(&self) -> BoxStream<'_, Result<StoreEvent<A::Event>, EventStoreError>> {
        Box::pin(
            futures::stream::once(async move {
                let guard = self.inner.read().await;

                // Aggregates are emitted in a stable order so rebuilds are
                // reproducible; within an aggregate, sequence order holds.
                let mut aggregate_ids: Vec<Uuid> = guard.keys().copied().collect();
                aggregate_ids.sort();

                let mut items = Vec::new();
                for aggregate_id in aggregate_ids {
                    for (index, record) in guard[&aggregate_id].iter().enumerate() {
                        items.push(Self::decode(aggregate_id, index as SequenceNumber + 1, record));
                    }
                }

                items
            })
            .flat_map(futures::stream::iter),
        )
    }
}
