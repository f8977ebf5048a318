use uuid::Uuid;

use crate::types::SequenceNumber;

/// Replay hit something the current state machine cannot explain: an event
/// kind with no declared transition, or a payload that no longer decodes.
///
/// This is never retried and never swallowed. The aggregate stays unavailable
/// for writes - every load deterministically re-raises this error - until the
/// machine registration is fixed.
#[derive(Debug, Clone, thiserror::Error)]
#[error("corrupt event stream for aggregate {aggregate_id}: {detail}")]
pub struct CorruptStream {
    pub aggregate_id: Uuid,
    pub detail: String,
}

/// Everything a [`submit`] can reject with.
///
/// Only [`Conflict`](Self::Conflict) (after reloading fresh state) and
/// [`Unavailable`](Self::Unavailable) are worth retrying; the remaining
/// variants are deterministic rejections of this particular request.
///
/// [`submit`]: crate::AggregateManager::submit
#[derive(Debug, thiserror::Error)]
pub enum EngineError<E>
where
    E: std::error::Error + 'static,
{
    /// No declared transition admits this command from the aggregate's
    /// current status. Also raised when an init command targets an existing
    /// aggregate, or a non-init command targets a missing one.
    #[error("command `{command}` is not allowed from state `{status}`")]
    InvalidTransition { command: &'static str, status: String },

    /// The acting identity lacks the resolved transition's capability.
    #[error("identity `{identity}` lacks required capability `{capability}`")]
    Unauthorized { identity: String, capability: String },

    /// Expected version mismatch, either on the fast path at validation or
    /// because another writer won the append race. Retryable after reloading.
    #[error("version conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    Conflict {
        aggregate_id: Uuid,
        expected: SequenceNumber,
        actual: SequenceNumber,
    },

    /// The aggregate was never committed to. [`load`] surfaces absence as
    /// `None`; [`require`] raises this instead, for calling layers that need
    /// absence as an error.
    ///
    /// [`load`]: crate::AggregateManager::load
    /// [`require`]: crate::AggregateManager::require
    #[error("aggregate {0} not found")]
    NotFound(Uuid),

    /// The command payload failed shape validation, before any transition
    /// resolution.
    #[error("command rejected: {0}")]
    Validation(#[source] E),

    #[error(transparent)]
    Corrupt(#[from] CorruptStream),

    /// The event store kept failing transiently after the router exhausted
    /// its backoff budget. The log is untouched; the request may be retried
    /// from scratch.
    #[error("event store unavailable, gave up after {attempts} attempts")]
    Unavailable {
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}
