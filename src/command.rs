use uuid::Uuid;

use crate::identity::Identity;
use crate::types::SequenceNumber;

/// A request to transition an aggregate. The payload is domain-specific; the
/// engine only needs the kind to resolve the matching [`Transition`].
///
/// [`Transition`]: crate::Transition
pub trait Command {
    /// The command kind, matched against [`Transition::command_kind`] during
    /// dispatch.
    ///
    /// [`Transition::command_kind`]: crate::Transition::command_kind
    fn kind(&self) -> &'static str;
}

/// A [`Command`] together with the metadata the router needs: the command id
/// (recorded on the committed event as its causation link), the target
/// aggregate, the acting identity and an optional expected version for the
/// optimistic-concurrency fast path.
#[derive(Debug, Clone)]
pub struct CommandEnvelope<C> {
    /// Uniquely identifies this command; committed events link back to it.
    pub id: Uuid,
    /// The target aggregate. `None` only for init commands, where the engine
    /// assigns a fresh id.
    pub aggregate_id: Option<Uuid>,
    /// When set, the command is rejected with a conflict if the aggregate is
    /// not exactly at this version when validated.
    pub expected_version: Option<SequenceNumber>,
    /// The identity acting on this command, checked against the resolved
    /// transition's required capability.
    pub identity: Identity,
    pub command: C,
}

impl<C> CommandEnvelope<C> {
    /// An envelope for an init command; the aggregate id is assigned by the
    /// engine on commit.
    pub fn init(identity: Identity, command: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: None,
            expected_version: None,
            identity,
            command,
        }
    }

    /// An envelope targeting an existing aggregate.
    pub fn targeting(aggregate_id: Uuid, identity: Identity, command: C) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: Some(aggregate_id),
            expected_version: None,
            identity,
            command,
        }
    }

    /// Sets the expected version, enabling the conflict fast path.
    #[must_use]
    pub fn at_version(mut self, expected_version: SequenceNumber) -> Self {
        self.expected_version = Some(expected_version);
        self
    }
}
