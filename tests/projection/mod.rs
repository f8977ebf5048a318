use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use chronik::{
    AggregateManager, BroadcastEventBus, CommandEnvelope, Event, InMemoryProjections, InMemoryStore, Projection,
    ProjectionStore, Projector, SequenceNumber,
};

use crate::aggregate::{admin, editor, machine, Catalogue, CatalogueCommand, CatalogueStatus};

type CatalogueProjector = Projector<Catalogue, InMemoryProjections<Catalogue>>;

fn setup() -> (AggregateManager<Catalogue>, InMemoryStore<Catalogue>, CatalogueProjector) {
    let store = InMemoryStore::new();
    let projector = Projector::new(machine(), InMemoryProjections::new(), Arc::new(store.clone()));
    let manager = AggregateManager::new(machine(), store.clone()).add_event_handler(projector.clone());

    (manager, store, projector)
}

fn create(title: &str) -> CommandEnvelope<CatalogueCommand> {
    CommandEnvelope::init(editor(), CatalogueCommand::Create { title: title.to_owned() })
}

fn rename(title: &str) -> CatalogueCommand {
    CatalogueCommand::Rename { title: title.to_owned() }
}

#[tokio::test]
async fn projecting_the_same_event_twice_is_a_no_op() {
    let (manager, _store, projector) = setup();

    let committed = manager.submit(create("idempotent")).await.expect("created");

    // The handler already projected this event once; project it again.
    projector.project(&committed).await.expect("duplicate is skipped");
    projector.project(&committed).await.expect("duplicate is skipped");

    let projection = projector.read(committed.aggregate_id).await.expect("projected");
    assert_eq!(projection.version, 1);
    assert_eq!(projection.fields.title, "idempotent");
    assert_eq!(projection.fields.revisions, 0);
}

#[tokio::test]
async fn a_gap_makes_the_projector_catch_up_from_the_log() {
    let store = InMemoryStore::new();
    // No handler registered: the manager commits without projecting.
    let manager = AggregateManager::new(machine(), store.clone());
    let projector: CatalogueProjector = Projector::new(machine(), InMemoryProjections::new(), Arc::new(store.clone()));

    let created = manager.submit(create("behind")).await.expect("created");
    let id = created.aggregate_id;
    let renamed = manager
        .submit(CommandEnvelope::targeting(id, editor(), rename("caught up")))
        .await
        .expect("renamed");

    // Deliver only the second event; sequence 1 must be folded first.
    projector.project(&renamed).await.expect("catches up");

    let projection = projector.read(id).await.expect("projected");
    assert_eq!(projection.version, 2);
    assert_eq!(projection.status, Some(CatalogueStatus::Active));
    assert_eq!(projection.fields.title, "caught up");
    assert_eq!(projection.fields.revisions, 1);
}

#[tokio::test]
async fn rebuild_from_scratch_agrees_with_incremental_projection() {
    let (manager, _store, projector) = setup();

    let first = manager.submit(create("replayable")).await.expect("created");
    let second = manager.submit(create("other record")).await.expect("created");
    manager
        .submit(CommandEnvelope::targeting(first.aggregate_id, editor(), rename("revised")))
        .await
        .expect("renamed");
    manager
        .submit(CommandEnvelope::targeting(second.aggregate_id, admin(), CatalogueCommand::Delete))
        .await
        .expect("deleted");

    let incremental_first = projector.read(first.aggregate_id).await.expect("projected");
    let incremental_second = projector.read(second.aggregate_id).await.expect("projected");

    projector.rebuild().await.expect("rebuild succeeds");

    let rebuilt_first = projector.read(first.aggregate_id).await.expect("projected");
    let rebuilt_second = projector.read(second.aggregate_id).await.expect("projected");

    assert_eq!(rebuilt_first.status, incremental_first.status);
    assert_eq!(rebuilt_first.version, incremental_first.version);
    assert_eq!(rebuilt_first.fields, incremental_first.fields);

    assert_eq!(rebuilt_second.status, incremental_second.status);
    assert_eq!(rebuilt_second.version, incremental_second.version);
    assert_eq!(rebuilt_second.fields, incremental_second.fields);
}

#[tokio::test]
async fn deleted_projections_can_be_rebuilt_at_will() {
    let (manager, _store, projector) = setup();

    let committed = manager.submit(create("expendable")).await.expect("created");
    let id = committed.aggregate_id;

    projector.projections().delete(id).await;
    assert!(projector.read(id).await.is_none());

    projector.rebuild().await.expect("rebuild succeeds");

    let projection = projector.read(id).await.expect("restored by replay");
    assert_eq!(projection.version, 1);
    assert_eq!(projection.fields.title, "expendable");
}

#[tokio::test]
async fn replayed_state_and_projection_agree() {
    let (manager, _store, projector) = setup();

    let created = manager.submit(create("in sync")).await.expect("created");
    let id = created.aggregate_id;
    manager
        .submit(CommandEnvelope::targeting(id, editor(), rename("still in sync")))
        .await
        .expect("renamed");

    let state = manager.load(id).await.expect("loadable").expect("exists");
    let projection = projector.read(id).await.expect("projected");

    assert_eq!(state.status(), projection.status);
    assert_eq!(state.sequence_number(), projection.version);
    assert_eq!(state.inner(), &projection.fields);
}

/// Delays the write of one projection version, widening the window between
/// reading a projection and writing it back.
struct SlowWriteProjections {
    inner: InMemoryProjections<Catalogue>,
    slow_version: SequenceNumber,
}

#[async_trait::async_trait]
impl ProjectionStore<Catalogue> for SlowWriteProjections {
    async fn get(&self, aggregate_id: Uuid) -> Option<Projection<Catalogue>> {
        self.inner.get(aggregate_id).await
    }

    async fn upsert(&self, projection: Projection<Catalogue>) {
        if projection.version == self.slow_version {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.inner.upsert(projection).await;
    }

    async fn delete(&self, aggregate_id: Uuid) {
        self.inner.delete(aggregate_id).await;
    }

    async fn clear(&self) {
        self.inner.clear().await;
    }
}

#[tokio::test]
async fn overlapping_deliveries_never_roll_a_projection_back() {
    let store = InMemoryStore::<Catalogue>::new();
    let manager = AggregateManager::new(machine(), store.clone());
    let projections = SlowWriteProjections {
        inner: InMemoryProjections::new(),
        slow_version: 2,
    };
    let projector = Projector::new(machine(), projections, Arc::new(store.clone()));

    let created = manager.submit(create("hot record")).await.expect("created");
    let id = created.aggregate_id;
    let second = manager
        .submit(CommandEnvelope::targeting(id, editor(), rename("v2")))
        .await
        .expect("renamed");
    let third = manager
        .submit(CommandEnvelope::targeting(id, editor(), rename("v3")))
        .await
        .expect("renamed");

    projector.project(&created).await.expect("projected");

    // Both successors in flight at once: the slow write of sequence 2 must
    // not land on top of sequence 3.
    let (left, right) = tokio::join!(projector.project(&second), projector.project(&third));
    left.expect("projected");
    right.expect("projected");

    let projection = projector.read(id).await.expect("projected");
    assert_eq!(projection.version, 3);
    assert_eq!(projection.fields.title, "v3");
    assert_eq!(projection.fields.revisions, 2);
}

#[tokio::test]
async fn subscribers_observe_committed_events_in_sequence_order() {
    let store = InMemoryStore::new();
    let bus = BroadcastEventBus::<Catalogue>::new(16);
    let mut subscription = bus.subscribe();
    let manager = AggregateManager::new(machine(), store).add_event_bus(bus);

    let created = manager.submit(create("broadcast")).await.expect("created");
    let id = created.aggregate_id;
    manager
        .submit(CommandEnvelope::targeting(id, editor(), rename("broadcast v2")))
        .await
        .expect("renamed");

    let first = subscription.recv().await.expect("first event published");
    let second = subscription.recv().await.expect("second event published");

    assert_eq!(first.sequence_number, 1);
    assert_eq!(first.payload.kind(), "created");
    assert_eq!(second.sequence_number, 2);
    assert_eq!(second.payload.kind(), "renamed");
    assert_eq!(second.aggregate_id, id);
}
