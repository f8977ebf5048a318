use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::error::CorruptStream;
use crate::event::Event;
use crate::handler::{EventHandler, ReplayableEventHandler};
use crate::machine::StateMachine;
use crate::store::{EventStore, EventStoreError, StoreEvent};
use crate::types::SequenceNumber;

/// A denormalized, queryable read model for one aggregate instance. Derived
/// purely by folding events - never authoritative, always rebuildable.
#[derive(Debug)]
pub struct Projection<A>
where
    A: Aggregate,
{
    pub aggregate_id: Uuid,
    /// `None` only for a freshly constructed projection that has folded
    /// nothing yet.
    pub status: Option<A::Status>,
    /// Sequence number of the last folded event.
    pub version: SequenceNumber,
    /// Materialized fields, built with the same fold the replayer uses.
    pub fields: A::State,
}

impl<A> Projection<A>
where
    A: Aggregate,
{
    pub fn fresh(aggregate_id: Uuid) -> Self {
        Self {
            aggregate_id,
            status: None,
            version: 0,
            fields: A::State::default(),
        }
    }
}

impl<A> Clone for Projection<A>
where
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            aggregate_id: self.aggregate_id,
            status: self.status,
            version: self.version,
            fields: self.fields.clone(),
        }
    }
}

/// Where projections live. Owned exclusively by the [`Projector`] deriving
/// them - nothing else writes here.
#[async_trait]
pub trait ProjectionStore<A>: Send + Sync
where
    A: Aggregate,
{
    async fn get(&self, aggregate_id: Uuid) -> Option<Projection<A>>;

    async fn upsert(&self, projection: Projection<A>);

    async fn delete(&self, aggregate_id: Uuid);

    /// Drops every projection, ahead of a rebuild.
    async fn clear(&self);
}

/// Reference in-memory [`ProjectionStore`]. Cheaply cloneable; clones share
/// the same map, so the query side can keep a handle while the projector
/// owns the writes.
pub struct InMemoryProjections<A>
where
    A: Aggregate,
{
    inner: Arc<RwLock<HashMap<Uuid, Projection<A>>>>,
}

impl<A> InMemoryProjections<A>
where
    A: Aggregate,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<A> Default for InMemoryProjections<A>
where
    A: Aggregate,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> Clone for InMemoryProjections<A>
where
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl<A> ProjectionStore<A> for InMemoryProjections<A>
where
    A: Aggregate,
{
    async fn get(&self, aggregate_id: Uuid) -> Option<Projection<A>> {
        self.inner.read().await.get(&aggregate_id).cloned()
    }

    async fn upsert(&self, projection: Projection<A>) {
        self.inner.write().await.insert(projection.aggregate_id, projection);
    }

    async fn delete(&self, aggregate_id: Uuid) {
        self.inner.write().await.remove(&aggregate_id);
    }

    async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

/// Why a projection could not be brought up to date.
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error(transparent)]
    Store(#[from] EventStoreError),

    #[error(transparent)]
    Corrupt(#[from] CorruptStream),
}

/// The evolver: folds committed events into [`Projection`]s.
///
/// Registered as an [`EventHandler`] on the manager, it applies each event
/// with the same pure fold the replayer uses, which is what keeps replay from
/// scratch and incremental application in bit-for-bit agreement.
///
/// Application is idempotent, keyed by version: an event at or below the
/// stored version is a duplicate and is skipped. An event further ahead than
/// `version + 1` makes the projector catch up from the event store first, so
/// sequence `n + 1` is never folded before `n`.
///
/// Deliveries for the same aggregate are serialized: the read-fold-write of
/// [`project`](Self::project) runs under a per-aggregate lock, so an
/// overlapping delivery can never write a stale projection over a newer one.
/// Different aggregates do not contend.
pub struct Projector<A, P>
where
    A: Aggregate,
    P: ProjectionStore<A>,
{
    machine: StateMachine<A::Status>,
    projections: P,
    source: Arc<dyn EventStore<A> + Send + Sync>,
    application_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl<A, P> Projector<A, P>
where
    A: Aggregate,
    P: ProjectionStore<A>,
{
    pub fn new(
        machine: StateMachine<A::Status>,
        projections: P,
        source: Arc<dyn EventStore<A> + Send + Sync>,
    ) -> Self {
        Self {
            machine,
            projections,
            source,
            application_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current-state lookup; `None` when the aggregate was never projected.
    pub async fn read(&self, aggregate_id: Uuid) -> Option<Projection<A>> {
        self.projections.get(aggregate_id).await
    }

    pub fn projections(&self) -> &P {
        &self.projections
    }

    /// Brings the projection of one aggregate up to date with a committed
    /// event, catching up on any missed predecessors from the store.
    pub async fn project(&self, store_event: &StoreEvent<A::Event>) -> Result<(), ProjectionError> {
        let lock = self.application_lock(store_event.aggregate_id).await;
        let _applying = lock.lock().await;

        let mut projection = self
            .projections
            .get(store_event.aggregate_id)
            .await
            .unwrap_or_else(|| Projection::fresh(store_event.aggregate_id));

        if projection.version >= store_event.sequence_number {
            // Duplicate delivery; already folded.
            return Ok(());
        }

        if store_event.sequence_number > projection.version + 1 {
            let missed = self
                .source
                .read(store_event.aggregate_id, projection.version + 1)
                .await?;
            for store_event in missed {
                self.fold(&mut projection, store_event)?;
            }
        } else {
            self.fold(&mut projection, store_event.clone())?;
        }

        self.projections.upsert(projection).await;

        Ok(())
    }

    /// Throws every projection away and rebuilds them by replaying the full
    /// event stream. The log is the source of truth; this is always safe.
    pub async fn rebuild(&self) -> Result<(), ProjectionError> {
        self.projections.clear().await;

        let mut stream = self.source.stream_all();
        while let Some(result) = stream.next().await {
            let store_event = result?;

            let mut projection = self
                .projections
                .get(store_event.aggregate_id)
                .await
                .unwrap_or_else(|| Projection::fresh(store_event.aggregate_id));

            self.fold(&mut projection, store_event)?;
            self.projections.upsert(projection).await;
        }

        Ok(())
    }

    async fn application_lock(&self, aggregate_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.application_locks.lock().await;
        Arc::clone(locks.entry(aggregate_id).or_default())
    }

    fn fold(&self, projection: &mut Projection<A>, store_event: StoreEvent<A::Event>) -> Result<(), CorruptStream> {
        if store_event.sequence_number <= projection.version {
            return Ok(());
        }

        let kind = store_event.payload.kind();
        let transition = self
            .machine
            .transition_for_event(kind)
            .ok_or_else(|| CorruptStream {
                aggregate_id: projection.aggregate_id,
                detail: format!(
                    "event `{kind}` at sequence {} is unknown to the state machine",
                    store_event.sequence_number
                ),
            })?;

        projection.status = Some(transition.to());
        projection.version = store_event.sequence_number;

        let fields = std::mem::take(&mut projection.fields);
        projection.fields = A::apply_event(fields, store_event.payload);

        Ok(())
    }
}

impl<A, P> Clone for Projector<A, P>
where
    A: Aggregate,
    P: ProjectionStore<A> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            machine: self.machine.clone(),
            projections: self.projections.clone(),
            source: Arc::clone(&self.source),
            application_locks: Arc::clone(&self.application_locks),
        }
    }
}

#[async_trait]
impl<A, P> EventHandler<A> for Projector<A, P>
where
    A: Aggregate,
    P: ProjectionStore<A>,
{
    async fn handle(&self, store_event: &StoreEvent<A::Event>) {
        if let Err(error) = self.project(store_event).await {
            tracing::error!(
                aggregate_id = %store_event.aggregate_id,
                sequence_number = store_event.sequence_number,
                error = ?error,
                "projector failed to apply committed event"
            );
        }
    }
}

impl<A, P> ReplayableEventHandler<A> for Projector<A, P>
where
    A: Aggregate,
    P: ProjectionStore<A>,
{
}
