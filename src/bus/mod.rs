use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::store::StoreEvent;

pub mod channel;

/// The responsibility of the [`EventBus`] trait is to publish a committed
/// event on a specific bus implementation, decoupling external projection
/// builders (search indexes, notification dispatchers) from the router.
///
/// Buses are constructed explicitly at startup and registered on the
/// [`AggregateManager`]; there is no process-wide publishing singleton.
///
/// [`AggregateManager`]: crate::AggregateManager
#[async_trait]
pub trait EventBus<A>: Sync
where
    A: Aggregate,
{
    /// Publish a committed event on the bus.
    ///
    /// All the errors should be handled from within the [`EventBus`] and
    /// shouldn't panic: publication happens after the append committed, and
    /// the log, not the bus, is the source of truth.
    async fn publish(&self, store_event: &StoreEvent<A::Event>);
}
