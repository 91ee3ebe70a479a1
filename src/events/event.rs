//! The six event variants the bus dispatches.

use std::collections::HashSet;

use crate::entity::EntityKind;
use crate::field::FieldTag;
use crate::identifier::{Id, SiteId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionAction {
    Connect,
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    pub action: ConnectionAction,
    pub entity: Id,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct EmitEvent {
    pub source: Id,
    pub target: Id,
    /// An id this event should be suppressed for (self-emit exclusion).
    pub exclude: Id,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityChangeAction {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct EntityChangedEvent {
    pub action: EntityChangeAction,
    pub id: Id,
    pub kind: EntityKind,
    pub owner: Id,
    pub changed_fields: HashSet<FieldTag>,
    pub flags_added: HashSet<String>,
    pub flags_removed: HashSet<String>,
    pub ids_added: HashSet<Id>,
    pub ids_removed: HashSet<Id>,
}

#[derive(Debug, Clone)]
pub struct MovementEvent {
    pub who: Id,
    pub from: Id,
    pub to: Id,
    pub how: String,
    pub movement_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Created,
    Killed,
    Completed,
}

#[derive(Debug, Clone)]
pub struct ProcessExecutionEvent {
    pub pid: u64,
    pub executable_id: Id,
    pub owner_id: Id,
    pub process_name: String,
    pub state: ProcessState,
    pub native: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteAction {
    Created,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct SiteEvent {
    pub action: SiteAction,
    pub site: SiteId,
}

#[derive(Debug, Clone)]
pub enum Event {
    Movement(MovementEvent),
    Emit(EmitEvent),
    Connection(ConnectionEvent),
    EntityChanged(EntityChangedEvent),
    ProcessExecution(ProcessExecutionEvent),
    Site(SiteEvent),
}
