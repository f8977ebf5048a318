use std::fmt::Debug;
use std::hash::Hash;

use crate::command::Command;
use crate::event::Event;

/// The contract an entity type implements to be managed by the engine.
///
/// An `Aggregate` contributes the *payload* side of the system: how commands
/// turn into event payloads and how event payloads fold into materialized
/// fields. Which commands are admissible from which status, and who may issue
/// them, is declared separately in the aggregate's [`StateMachine`] - the
/// router consults the machine before any of the functions here run.
///
/// Both functions must be pure: same inputs, same outputs, no I/O. This is
/// what makes replay from scratch and incremental projection agree.
///
/// [`StateMachine`]: crate::StateMachine
pub trait Aggregate: Send + Sync + 'static {
    /// The aggregate type name, used in tracing spans.
    const NAME: &'static str;

    /// The lifecycle status enum. Using an enum makes "transition to an
    /// undeclared state" unrepresentable.
    type Status: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Materialized fields derived purely from folding events; `Default` is
    /// the pre-init value.
    type State: Default + Clone + Send + Sync + 'static;

    type Command: Command + Send + Sync + 'static;

    type Event: Event + Clone + Send + Sync + 'static;

    /// Command rejection error for shape validation.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Validates the command payload before transition resolution. Status
    /// admissibility is not checked here - that is the machine's job.
    fn validate(command: &Self::Command) -> Result<(), Self::Error>;

    /// Derives the event payload for an accepted command. Only called after
    /// the machine resolved a transition and the identity was authorized; the
    /// returned event's [`kind`] must be the resolved transition's event kind.
    ///
    /// [`kind`]: crate::Event::kind
    fn produce_event(state: &Self::State, command: Self::Command) -> Self::Event;

    /// Folds one event into the materialized fields.
    fn apply_event(state: Self::State, payload: Self::Event) -> Self::State;
}
