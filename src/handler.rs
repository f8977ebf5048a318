use std::ops::Deref;

use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::store::StoreEvent;

/// A reactive subscriber to committed events, registered on the
/// [`AggregateManager`] at startup and notified after every successful
/// append, in per-aggregate sequence order.
///
/// All the errors should be handled from within the `EventHandler` and
/// shouldn't panic - a read model falling behind must never fail the write
/// that triggered it.
///
/// [`AggregateManager`]: crate::AggregateManager
#[async_trait]
pub trait EventHandler<A>: Sync
where
    A: Aggregate,
{
    /// Handle a committed event. This could update a read model or perform a
    /// side effect.
    async fn handle(&self, store_event: &StoreEvent<A::Event>);

    /// The name of the event handler, used as part of tracing spans to
    /// identify the handler being run. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Blanket implementation making an [`EventHandler`] of every (smart)
/// pointer to an [`EventHandler`], e.g. `&H`, `Box<H>`, `Arc<H>`.
#[async_trait]
impl<A, H, T> EventHandler<A> for T
where
    A: Aggregate,
    H: EventHandler<A> + ?Sized,
    T: Deref<Target = H> + Send + Sync,
{
    async fn handle(&self, store_event: &StoreEvent<A::Event>) {
        self.deref().handle(store_event).await;
    }

    fn name(&self) -> &'static str {
        self.deref().name()
    }
}

/// Marker for event handlers whose effect is idempotent and derived purely
/// from the event stream, making them safe to run again during a rebuild.
/// Handlers performing external side effects (mail, webhooks) must not be
/// marked replayable.
pub trait ReplayableEventHandler<A>: Sync
where
    Self: EventHandler<A>,
    A: Aggregate,
{
}
