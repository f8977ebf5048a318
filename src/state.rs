use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::error::CorruptStream;
use crate::event::Event;
use crate::machine::StateMachine;
use crate::store::StoreEvent;
use crate::types::SequenceNumber;

/// The authoritative picture of one aggregate instance at a point in time:
/// its lifecycle status, the sequence number of the last folded event and the
/// materialized fields.
///
/// Reconstructed by folding the event history in sequence order. The fold is
/// pure, so replaying the same events always yields the same state - the
/// property that lets projections be thrown away and rebuilt at will.
pub struct AggregateState<A>
where
    A: Aggregate,
{
    id: Uuid,
    sequence_number: SequenceNumber,
    status: Option<A::Status>,
    inner: A::State,
}

impl<A> AggregateState<A>
where
    A: Aggregate,
{
    /// A pre-init state: no status, version 0, default fields.
    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            sequence_number: 0,
            status: None,
            inner: A::State::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Sequence number of the last folded event; 0 before init.
    pub fn sequence_number(&self) -> SequenceNumber {
        self.sequence_number
    }

    /// `None` until the init event is folded.
    pub fn status(&self) -> Option<A::Status> {
        self.status
    }

    pub fn inner(&self) -> &A::State {
        &self.inner
    }

    pub fn into_inner(self) -> A::State {
        self.inner
    }

    /// Folds committed events, in the order given, onto this state: the
    /// status comes from the transition that committed each event kind, the
    /// fields from the aggregate's pure fold function.
    ///
    /// An event kind unknown to the machine aborts the fold with
    /// [`CorruptStream`]; a stream that cannot be explained must never be
    /// silently skipped over.
    pub fn apply_store_events(
        mut self,
        store_events: Vec<StoreEvent<A::Event>>,
        machine: &StateMachine<A::Status>,
    ) -> Result<Self, CorruptStream> {
        for store_event in store_events {
            let kind = store_event.payload.kind();
            let transition = machine.transition_for_event(kind).ok_or_else(|| CorruptStream {
                aggregate_id: self.id,
                detail: format!(
                    "event `{kind}` at sequence {} is unknown to the state machine",
                    store_event.sequence_number
                ),
            })?;

            self.status = Some(transition.to());
            self.sequence_number = store_event.sequence_number;

            let inner = std::mem::take(&mut self.inner);
            self.inner = A::apply_event(inner, store_event.payload);
        }

        Ok(self)
    }
}

impl<A> Clone for AggregateState<A>
where
    A: Aggregate,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sequence_number: self.sequence_number,
            status: self.status,
            inner: self.inner.clone(),
        }
    }
}
