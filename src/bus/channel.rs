use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::aggregate::Aggregate;
use crate::bus::EventBus;
use crate::store::StoreEvent;

/// In-process [`EventBus`] over a [`tokio::sync::broadcast`] channel.
///
/// Each subscriber gets every event committed after it subscribed, in
/// per-aggregate sequence order. A subscriber that falls more than
/// `capacity` events behind observes a `Lagged` error from its receiver and
/// must re-sync from the event store - the log is always authoritative.
///
/// The bus is cheaply cloneable; clones publish into the same channel. The
/// channel closes when the last bus clone and all receivers are dropped,
/// which ties its lifecycle to whoever constructed it.
pub struct BroadcastEventBus<A>
where
    A: Aggregate,
{
    sender: broadcast::Sender<StoreEvent<A::Event>>,
}

impl<A> BroadcastEventBus<A>
where
    A: Aggregate,
{
    /// Creates a bus buffering up to `capacity` events per lagging
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a new subscription receiving every event committed from now
    /// on.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent<A::Event>> {
        self.sender.subscribe()
    }
}

impl<A> Clone for BroadcastEventBus<A>
where
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[async_trait]
impl<A> EventBus<A> for BroadcastEventBus<A>
where
    A: Aggregate,
{
    async fn publish(&self, store_event: &StoreEvent<A::Event>) {
        // send only fails when no receiver is subscribed; the event is
        // already durable in the log, so that is not an error.
        if self.sender.send(store_event.clone()).is_err() {
            tracing::trace!(
                aggregate_id = %store_event.aggregate_id,
                sequence_number = store_event.sequence_number,
                "no live subscribers for committed event"
            );
        }
    }
}
