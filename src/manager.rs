use std::time::Duration;

use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::bus::EventBus;
use crate::command::{Command, CommandEnvelope};
use crate::error::{CorruptStream, EngineError};
use crate::event::Event;
use crate::handler::EventHandler;
use crate::machine::StateMachine;
use crate::state::AggregateState;
use crate::store::{EventStore, EventStoreError, StoreEvent};
use crate::types::SequenceNumber;

/// Backoff applied by the router to transient store failures, and to those
/// only: conflicts are never retried internally, because a meaningful retry
/// must reload fresh state first, and that is the caller's decision.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        // Exponential: base, 2*base, 4*base, ...
        self.base_delay.saturating_mul(1 << attempt.saturating_sub(1).min(16))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// The command router: the single entry point that turns a command into
/// either a committed event or a rejection, and the only component in the
/// system that mutates anything.
///
/// The manager couples an [`Aggregate`] with its [`StateMachine`] and an
/// [`EventStore`]. It takes no lock around an aggregate: concurrent writers
/// targeting the same instance race on the store's compare-and-swap append,
/// and exactly one of them wins. Commands targeting different aggregates do
/// not contend at all.
pub struct AggregateManager<A>
where
    A: Aggregate,
{
    machine: StateMachine<A::Status>,
    event_store: Box<dyn EventStore<A> + Send + Sync>,
    event_handlers: Vec<Box<dyn EventHandler<A> + Send + Sync>>,
    event_buses: Vec<Box<dyn EventBus<A> + Send + Sync>>,
    retry: RetryPolicy,
}

impl<A> AggregateManager<A>
where
    A: Aggregate,
{
    pub fn new(machine: StateMachine<A::Status>, event_store: impl EventStore<A> + 'static) -> Self {
        Self {
            machine,
            event_store: Box::new(event_store),
            event_handlers: vec![],
            event_buses: vec![],
            retry: RetryPolicy::default(),
        }
    }

    /// Registers an event handler, notified synchronously after every
    /// successful append, in registration order.
    #[must_use]
    pub fn add_event_handler(mut self, event_handler: impl EventHandler<A> + Send + Sync + 'static) -> Self {
        self.event_handlers.push(Box::new(event_handler));
        self
    }

    /// Registers an event bus, published to after all handlers ran.
    #[must_use]
    pub fn add_event_bus(mut self, event_bus: impl EventBus<A> + Send + Sync + 'static) -> Self {
        self.event_buses.push(Box::new(event_bus));
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Routes one command: load, resolve, authorize, append, notify.
    ///
    /// On success the committed event is returned to the caller; read models
    /// registered as handlers have already observed it. A
    /// [`Conflict`](EngineError::Conflict) means another writer committed
    /// between load and append - safe to retry by resubmitting, which reloads
    /// fresh state.
    #[tracing::instrument(skip_all, fields(aggregate = A::NAME, command = envelope.command.kind()), err)]
    pub async fn submit(
        &self,
        envelope: CommandEnvelope<A::Command>,
    ) -> Result<StoreEvent<A::Event>, EngineError<A::Error>> {
        A::validate(&envelope.command).map_err(EngineError::Validation)?;

        let command_kind = envelope.command.kind();

        let state = match envelope.aggregate_id {
            Some(aggregate_id) => self.load(aggregate_id).await?,
            None => None,
        };

        let fresh = A::State::default();
        let (aggregate_id, status, version, fields) = match &state {
            Some(state) => (state.id(), state.status(), state.sequence_number(), state.inner()),
            // Init path: the engine assigns the id unless the caller chose one.
            None => (envelope.aggregate_id.unwrap_or_else(Uuid::new_v4), None, 0, &fresh),
        };

        let transition = self
            .machine
            .resolve(command_kind, status)
            .ok_or_else(|| EngineError::InvalidTransition {
                command: command_kind,
                status: status_label(status),
            })?;

        if !envelope.identity.can(transition.required_capability()) {
            return Err(EngineError::Unauthorized {
                identity: envelope.identity.name().to_owned(),
                capability: transition.required_capability().to_string(),
            });
        }

        // Fast path: a stale expected version is rejected before wasting an
        // append attempt on the store.
        if let Some(expected) = envelope.expected_version {
            if expected != version {
                return Err(EngineError::Conflict {
                    aggregate_id,
                    expected,
                    actual: version,
                });
            }
        }

        let event = A::produce_event(fields, envelope.command);
        if event.kind() != transition.event_kind() {
            // Appending it would leave an event in the log that replay
            // attributes to the wrong transition.
            return Err(EngineError::Corrupt(CorruptStream {
                aggregate_id,
                detail: format!(
                    "command `{command_kind}` produced event `{}` but its transition emits `{}`; nothing was appended",
                    event.kind(),
                    transition.event_kind()
                ),
            }));
        }

        let store_event = self
            .append_with_retry(aggregate_id, version, event, envelope.id)
            .await?;

        self.dispatch(&store_event).await;

        Ok(store_event)
    }

    /// Reconstructs the current state of an aggregate by replaying its full
    /// event history. `None` means no event was ever committed for this id.
    pub async fn load(&self, aggregate_id: Uuid) -> Result<Option<AggregateState<A>>, EngineError<A::Error>> {
        let store_events = self.read_with_retry(aggregate_id, 1).await?;

        if store_events.is_empty() {
            return Ok(None);
        }

        AggregateState::with_id(aggregate_id)
            .apply_store_events(store_events, &self.machine)
            .map(Some)
            .map_err(EngineError::from)
    }

    /// Like [`load`](Self::load), for callers that treat absence as an
    /// error rather than a value.
    pub async fn require(&self, aggregate_id: Uuid) -> Result<AggregateState<A>, EngineError<A::Error>> {
        self.load(aggregate_id)
            .await?
            .ok_or(EngineError::NotFound(aggregate_id))
    }

    pub fn machine(&self) -> &StateMachine<A::Status> {
        &self.machine
    }

    async fn append_with_retry(
        &self,
        aggregate_id: Uuid,
        expected_version: SequenceNumber,
        event: A::Event,
        causation_id: Uuid,
    ) -> Result<StoreEvent<A::Event>, EngineError<A::Error>> {
        let mut attempt: u32 = 1;

        loop {
            match self
                .event_store
                .append(aggregate_id, expected_version, event.clone(), causation_id)
                .await
            {
                Ok(store_event) => return Ok(store_event),
                Err(EventStoreError::VersionConflict {
                    aggregate_id,
                    expected,
                    actual,
                }) => {
                    // Another writer won the race between load and append.
                    return Err(EngineError::Conflict {
                        aggregate_id,
                        expected,
                        actual,
                    });
                }
                Err(EventStoreError::Serde(error)) => {
                    return Err(EngineError::Corrupt(CorruptStream {
                        aggregate_id,
                        detail: format!("event payload could not be encoded: {error}"),
                    }));
                }
                Err(EventStoreError::Unavailable(source)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(EngineError::Unavailable {
                            attempts: attempt,
                            source,
                        });
                    }
                    tracing::warn!(%aggregate_id, attempt, "event store unavailable during append, backing off");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn read_with_retry(
        &self,
        aggregate_id: Uuid,
        from_sequence: SequenceNumber,
    ) -> Result<Vec<StoreEvent<A::Event>>, EngineError<A::Error>> {
        let mut attempt: u32 = 1;

        loop {
            match self.event_store.read(aggregate_id, from_sequence).await {
                Ok(store_events) => return Ok(store_events),
                Err(EventStoreError::Unavailable(source)) => {
                    if attempt >= self.retry.max_attempts {
                        return Err(EngineError::Unavailable {
                            attempts: attempt,
                            source,
                        });
                    }
                    tracing::warn!(%aggregate_id, attempt, "event store unavailable during read, backing off");
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                    attempt += 1;
                }
                Err(EventStoreError::Serde(error)) => {
                    return Err(EngineError::Corrupt(CorruptStream {
                        aggregate_id,
                        detail: format!("stored payload could not be decoded: {error}"),
                    }));
                }
                Err(EventStoreError::VersionConflict { aggregate_id, .. }) => {
                    // Reads carry no expected version; a store doing this is
                    // not honoring the adapter contract.
                    return Err(EngineError::Corrupt(CorruptStream {
                        aggregate_id,
                        detail: "store reported a version conflict on read".to_owned(),
                    }));
                }
            }
        }
    }

    async fn dispatch(&self, store_event: &StoreEvent<A::Event>) {
        for event_handler in &self.event_handlers {
            let span = tracing::debug_span!(
                "chronik.event_handler",
                event_id = %store_event.id,
                aggregate_id = %store_event.aggregate_id,
                event_handler = event_handler.name()
            );
            let _e = span.enter();

            event_handler.handle(store_event).await;
        }

        let futures: Vec<_> = self
            .event_buses
            .iter()
            .map(|event_bus| event_bus.publish(store_event))
            .collect();
        futures::future::join_all(futures).await;
    }
}

fn status_label<S: std::fmt::Debug>(status: Option<S>) -> String {
    match status {
        Some(status) => format!("{status:?}"),
        None => "(none)".to_owned(),
    }
}
