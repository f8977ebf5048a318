use crate::identity::Capability;

/// A declared transition rule: which command kind is admissible from which
/// statuses, the event kind it commits, the status it leads to and the
/// capability the acting identity must hold.
#[derive(Debug, Clone)]
pub struct Transition<S> {
    command: &'static str,
    init: bool,
    from: Vec<S>,
    event: &'static str,
    to: S,
    required: Capability,
}

impl<S: Copy + Eq> Transition<S> {
    pub fn command_kind(&self) -> &'static str {
        self.command
    }

    pub fn event_kind(&self) -> &'static str {
        self.event
    }

    pub fn to(&self) -> S {
        self.to
    }

    pub fn required_capability(&self) -> &Capability {
        &self.required
    }

    /// An init transition creates the aggregate; it is admissible only when
    /// no event exists yet.
    pub fn is_init(&self) -> bool {
        self.init
    }

    fn allows(&self, status: Option<S>) -> bool {
        match status {
            None => self.init,
            Some(status) => self.from.contains(&status),
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        if self.command != other.command {
            return false;
        }
        if self.init && other.init {
            return true;
        }
        self.from.iter().any(|status| other.from.contains(status))
    }
}

/// Rejected state machine definitions, detected eagerly at [`build`] rather
/// than at first dispatch.
///
/// [`build`]: StateMachineBuilder::build
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MachineDefError {
    /// Two transitions share a command kind with overlapping source statuses,
    /// so a dispatch could match both.
    #[error("ambiguous dispatch: command `{command}` is declared more than once for an overlapping set of source states")]
    AmbiguousCommand { command: &'static str },

    /// A non-init transition declared no source statuses. Creation rules must
    /// go through [`StateMachineBuilder::init`].
    #[error("transition for command `{command}` declares no source states; use `init` for creation transitions")]
    EmptyFromStates { command: &'static str },

    /// The same event kind is produced by transitions with different target
    /// statuses, which would make the replay fold non-deterministic.
    #[error("event `{event}` is produced by transitions with different target states")]
    ConflictingEvent { event: &'static str },

    #[error("a state machine needs at least one transition")]
    Empty,
}

/// The validated, immutable transition table for one aggregate type.
///
/// Built once at process startup through [`StateMachine::builder`]; read-only
/// thereafter. Resolution is a pure table lookup - no I/O, no locking.
#[derive(Debug, Clone)]
pub struct StateMachine<S> {
    transitions: Vec<Transition<S>>,
}

impl<S: Copy + Eq> StateMachine<S> {
    pub fn builder() -> StateMachineBuilder<S> {
        StateMachineBuilder { transitions: vec![] }
    }

    /// Returns the single transition matching the command kind from the given
    /// status, or `None` when the command is not admissible. A `None` status
    /// (aggregate does not exist yet) matches only init transitions; a status
    /// with no outgoing transitions is terminal and matches nothing.
    ///
    /// Uniqueness of the match is guaranteed by the overlap validation at
    /// build time.
    pub fn resolve(&self, command_kind: &str, status: Option<S>) -> Option<&Transition<S>> {
        self.transitions
            .iter()
            .find(|transition| transition.command == command_kind && transition.allows(status))
    }

    /// Returns the transition that commits the given event kind, used by the
    /// replay fold to recover the status an event led to. `None` means the
    /// event stream contains a kind unknown to this machine.
    pub fn transition_for_event(&self, event_kind: &str) -> Option<&Transition<S>> {
        self.transitions.iter().find(|transition| transition.event == event_kind)
    }
}

/// Fluent builder for a [`StateMachine`]. All validation happens in
/// [`build`](Self::build), so a malformed definition fails at registration,
/// not at first use.
pub struct StateMachineBuilder<S> {
    transitions: Vec<Transition<S>>,
}

impl<S: Copy + Eq> StateMachineBuilder<S> {
    /// Declares an init transition: admissible only when the aggregate does
    /// not exist yet, committing `event` and leaving the aggregate in `to`.
    #[must_use]
    pub fn init(mut self, command: &'static str, event: &'static str, to: S, required: Capability) -> Self {
        self.transitions.push(Transition {
            command,
            init: true,
            from: vec![],
            event,
            to,
            required,
        });
        self
    }

    /// Declares a transition admissible from any of the `from` statuses.
    #[must_use]
    pub fn transition(
        mut self,
        command: &'static str,
        from: &[S],
        event: &'static str,
        to: S,
        required: Capability,
    ) -> Self {
        self.transitions.push(Transition {
            command,
            init: false,
            from: from.to_vec(),
            event,
            to,
            required,
        });
        self
    }

    pub fn build(self) -> Result<StateMachine<S>, MachineDefError> {
        if self.transitions.is_empty() {
            return Err(MachineDefError::Empty);
        }

        if let Some(transition) = self
            .transitions
            .iter()
            .find(|transition| !transition.init && transition.from.is_empty())
        {
            return Err(MachineDefError::EmptyFromStates {
                command: transition.command,
            });
        }

        for (index, transition) in self.transitions.iter().enumerate() {
            for other in &self.transitions[index + 1..] {
                if transition.overlaps(other) {
                    return Err(MachineDefError::AmbiguousCommand {
                        command: transition.command,
                    });
                }
                if transition.event == other.event && transition.to != other.to {
                    return Err(MachineDefError::ConflictingEvent {
                        event: transition.event,
                    });
                }
            }
        }

        Ok(StateMachine {
            transitions: self.transitions,
        })
    }
}
