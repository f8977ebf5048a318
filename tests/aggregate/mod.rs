use serde::{Deserialize, Serialize};

use chronik::{Aggregate, Capability, Command, Event, Identity, StateMachine, Upcaster};

/// A registry catalogue: created active, renamable while active, archivable,
/// and deletable by an admin. `Deleted` is terminal.
pub struct Catalogue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CatalogueStatus {
    Active,
    Archived,
    Deleted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogueRecord {
    pub title: String,
    pub revisions: u32,
}

#[derive(Debug, Clone)]
pub enum CatalogueCommand {
    Create { title: String },
    Rename { title: String },
    Archive,
    Delete,
}

impl Command for CatalogueCommand {
    fn kind(&self) -> &'static str {
        match self {
            CatalogueCommand::Create { .. } => "create",
            CatalogueCommand::Rename { .. } => "rename",
            CatalogueCommand::Archive => "archive",
            CatalogueCommand::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogueEvent {
    Created { title: String },
    Renamed { title: String },
    Archived,
    Deleted,
}

impl Upcaster for CatalogueEvent {}

impl Event for CatalogueEvent {
    fn kind(&self) -> &'static str {
        match self {
            CatalogueEvent::Created { .. } => "created",
            CatalogueEvent::Renamed { .. } => "renamed",
            CatalogueEvent::Archived => "archived",
            CatalogueEvent::Deleted => "deleted",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogueError {
    #[error("title must not be empty")]
    EmptyTitle,
}

impl Aggregate for Catalogue {
    const NAME: &'static str = "catalogue";
    type Status = CatalogueStatus;
    type State = CatalogueRecord;
    type Command = CatalogueCommand;
    type Event = CatalogueEvent;
    type Error = CatalogueError;

    fn validate(command: &Self::Command) -> Result<(), Self::Error> {
        match command {
            CatalogueCommand::Create { title } | CatalogueCommand::Rename { title } if title.trim().is_empty() => {
                Err(CatalogueError::EmptyTitle)
            }
            _ => Ok(()),
        }
    }

    fn produce_event(_state: &Self::State, command: Self::Command) -> Self::Event {
        match command {
            CatalogueCommand::Create { title } => CatalogueEvent::Created { title },
            CatalogueCommand::Rename { title } => CatalogueEvent::Renamed { title },
            CatalogueCommand::Archive => CatalogueEvent::Archived,
            CatalogueCommand::Delete => CatalogueEvent::Deleted,
        }
    }

    fn apply_event(state: Self::State, payload: Self::Event) -> Self::State {
        match payload {
            CatalogueEvent::Created { title } => CatalogueRecord { title, revisions: 0 },
            CatalogueEvent::Renamed { title } => CatalogueRecord {
                title,
                revisions: state.revisions + 1,
            },
            CatalogueEvent::Archived | CatalogueEvent::Deleted => state,
        }
    }
}

pub fn writer_capability() -> Capability {
    Capability::new("catalogue:write")
}

pub fn admin_capability() -> Capability {
    Capability::new("catalogue:admin")
}

pub fn machine() -> StateMachine<CatalogueStatus> {
    StateMachine::builder()
        .init("create", "created", CatalogueStatus::Active, writer_capability())
        .transition(
            "rename",
            &[CatalogueStatus::Active],
            "renamed",
            CatalogueStatus::Active,
            writer_capability(),
        )
        .transition(
            "archive",
            &[CatalogueStatus::Active],
            "archived",
            CatalogueStatus::Archived,
            writer_capability(),
        )
        .transition(
            "delete",
            &[CatalogueStatus::Active, CatalogueStatus::Archived],
            "deleted",
            CatalogueStatus::Deleted,
            admin_capability(),
        )
        .build()
        .expect("catalogue machine is valid")
}

pub fn editor() -> Identity {
    Identity::new("editor").grant(writer_capability())
}

pub fn admin() -> Identity {
    Identity::new("admin").grant(writer_capability()).grant(admin_capability())
}
