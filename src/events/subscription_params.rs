//! Per-event-type subscription filters. Shared contract: an unset field
//! is a wildcard, multiple values within one field are OR'd, and
//! distinct fields are AND'd together.

use std::collections::HashSet;

use crate::entity::EntityKind;
use crate::events::event::{
    ConnectionAction, ConnectionEvent, Event, EmitEvent, EntityChangeAction, EntityChangedEvent, MovementEvent,
    ProcessExecutionEvent, ProcessState, SiteEvent,
};
use crate::field::FieldTag;
use crate::identifier::{Id, SiteId};

fn id_or_site_ok(ids: &Option<HashSet<Id>>, sites: &Option<HashSet<SiteId>>) -> bool {
    !(ids.is_some() && sites.is_some())
}

fn matches_id_or_site(id: Id, ids: &Option<HashSet<Id>>, sites: &Option<HashSet<SiteId>>) -> bool {
    if let Some(ids) = ids {
        return ids.contains(&id);
    }
    if let Some(sites) = sites {
        return sites.contains(&id.site());
    }
    true
}

fn set_intersects<T: Eq + std::hash::Hash>(filter: &Option<HashSet<T>>, haystack: &HashSet<T>) -> bool {
    match filter {
        None => true,
        Some(wanted) => wanted.iter().any(|item| haystack.contains(item)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionSubscriptionParams {
    pub action: Option<ConnectionAction>,
    pub entity_ids: Option<HashSet<Id>>,
    pub site_ids: Option<HashSet<SiteId>>,
    pub source_contains: Option<String>,
}

impl ConnectionSubscriptionParams {
    pub fn validate(&self) -> bool {
        id_or_site_ok(&self.entity_ids, &self.site_ids)
    }

    pub fn is_match(&self, event: &ConnectionEvent) -> bool {
        if let Some(action) = self.action {
            if action != event.action {
                return false;
            }
        }
        if !matches_id_or_site(event.entity, &self.entity_ids, &self.site_ids) {
            return false;
        }
        if let Some(needle) = &self.source_contains {
            if !event.source.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct EmitSubscriptionParams {
    pub source_id: Option<Id>,
    pub target_id: Option<Id>,
    pub my_id: Option<Id>,
}

impl EmitSubscriptionParams {
    pub fn validate(&self) -> bool {
        self.source_id.is_some() || self.target_id.is_some()
    }

    pub fn is_match(&self, event: &EmitEvent) -> bool {
        if let Some(my_id) = self.my_id {
            if event.exclude == my_id {
                return false;
            }
        }
        if let Some(source_id) = self.source_id {
            if event.source != source_id {
                return false;
            }
        }
        if let Some(target_id) = self.target_id {
            if event.target != target_id {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityChangedSubscriptionParams {
    pub action: Option<EntityChangeAction>,
    pub entity_ids: Option<HashSet<Id>>,
    pub site_ids: Option<HashSet<SiteId>>,
    pub entity_ids_are_owners: bool,
    pub entity_types: Option<HashSet<EntityKind>>,
    pub changed_fields: Option<HashSet<FieldTag>>,
    pub flags_added: Option<HashSet<String>>,
    pub flags_removed: Option<HashSet<String>>,
    pub ids_added: Option<HashSet<Id>>,
    pub ids_removed: Option<HashSet<Id>>,
}

impl EntityChangedSubscriptionParams {
    pub fn validate(&self) -> bool {
        id_or_site_ok(&self.entity_ids, &self.site_ids)
    }

    pub fn is_match(&self, event: &EntityChangedEvent) -> bool {
        if let Some(action) = self.action {
            if action != event.action {
                return false;
            }
        }

        let filter_id = if self.entity_ids_are_owners { event.owner } else { event.id };
        if !matches_id_or_site(filter_id, &self.entity_ids, &self.site_ids) {
            return false;
        }

        if let Some(types) = &self.entity_types {
            if !types.contains(&event.kind) {
                return false;
            }
        }
        if !set_intersects(&self.changed_fields, &event.changed_fields) {
            return false;
        }
        if !set_intersects(&self.flags_added, &event.flags_added) {
            return false;
        }
        if !set_intersects(&self.flags_removed, &event.flags_removed) {
            return false;
        }
        if !set_intersects(&self.ids_added, &event.ids_added) {
            return false;
        }
        if !set_intersects(&self.ids_removed, &event.ids_removed) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct MovementSubscriptionParams {
    pub who: Option<Id>,
    pub from: Option<Id>,
    pub to: Option<Id>,
    pub how: Option<String>,
    pub movement_type: Option<String>,
    pub site_id: Option<SiteId>,
}

impl MovementSubscriptionParams {
    pub fn validate(&self) -> bool {
        if self.site_id.is_some() {
            return self.who.is_none() && self.from.is_none() && self.to.is_none();
        }
        true
    }

    pub fn is_match(&self, event: &MovementEvent) -> bool {
        if let Some(site_id) = self.site_id {
            return event.who.site() == site_id || event.from.site() == site_id || event.to.site() == site_id;
        }
        if let Some(who) = self.who {
            if event.who != who {
                return false;
            }
        }
        if let Some(from) = self.from {
            if event.from != from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if event.to != to {
                return false;
            }
        }
        if let Some(how) = &self.how {
            if &event.how != how {
                return false;
            }
        }
        if let Some(movement_type) = &self.movement_type {
            if &event.movement_type != movement_type {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessExecutionSubscriptionParams {
    pub pid: Option<u64>,
    pub executable_id: Option<Id>,
    pub executable_site: Option<SiteId>,
    pub owner_id: Option<Id>,
    pub owner_site: Option<SiteId>,
    pub process_name: Option<String>,
    pub states: Option<HashSet<ProcessState>>,
    pub native: Option<bool>,
}

impl ProcessExecutionSubscriptionParams {
    pub fn validate(&self) -> bool {
        !(self.executable_id.is_some() && self.executable_site.is_some())
            && !(self.owner_id.is_some() && self.owner_site.is_some())
    }

    pub fn is_match(&self, event: &ProcessExecutionEvent) -> bool {
        if let Some(pid) = self.pid {
            if event.pid != pid {
                return false;
            }
        }
        if let Some(executable_id) = self.executable_id {
            if event.executable_id != executable_id {
                return false;
            }
        } else if let Some(site) = self.executable_site {
            if event.executable_id.site() != site {
                return false;
            }
        }
        if let Some(owner_id) = self.owner_id {
            if event.owner_id != owner_id {
                return false;
            }
        } else if let Some(site) = self.owner_site {
            if event.owner_id.site() != site {
                return false;
            }
        }
        if let Some(name) = &self.process_name {
            if &event.process_name != name {
                return false;
            }
        }
        if let Some(states) = &self.states {
            if !states.contains(&event.state) {
                return false;
            }
        }
        if let Some(native) = self.native {
            if event.native != native {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SiteSubscriptionParams;

impl SiteSubscriptionParams {
    pub fn validate(&self) -> bool {
        true
    }

    pub fn is_match(&self, _event: &SiteEvent) -> bool {
        true
    }
}

/// The union of every per-event-type params variant, used wherever a
/// subscription must be stored and dispatched generically.
#[derive(Debug, Clone)]
pub enum SubscriptionParams {
    Connection(ConnectionSubscriptionParams),
    Emit(EmitSubscriptionParams),
    EntityChanged(EntityChangedSubscriptionParams),
    Movement(MovementSubscriptionParams),
    ProcessExecution(ProcessExecutionSubscriptionParams),
    Site(SiteSubscriptionParams),
}

impl SubscriptionParams {
    pub fn validate(&self) -> bool {
        match self {
            SubscriptionParams::Connection(p) => p.validate(),
            SubscriptionParams::Emit(p) => p.validate(),
            SubscriptionParams::EntityChanged(p) => p.validate(),
            SubscriptionParams::Movement(p) => p.validate(),
            SubscriptionParams::ProcessExecution(p) => p.validate(),
            SubscriptionParams::Site(p) => p.validate(),
        }
    }

    /// Evaluates the match for whichever event variant actually lines up
    /// with this params variant. A mismatched pair (asked to match a
    /// `Connection` event against `EmitSubscriptionParams`, say) is a
    /// caller bug upstream of here and is treated as "no match" rather
    /// than a panic.
    pub fn is_match(&self, event: &Event) -> bool {
        match (self, event) {
            (SubscriptionParams::Connection(p), Event::Connection(e)) => p.is_match(e),
            (SubscriptionParams::Emit(p), Event::Emit(e)) => p.is_match(e),
            (SubscriptionParams::EntityChanged(p), Event::EntityChanged(e)) => p.is_match(e),
            (SubscriptionParams::Movement(p), Event::Movement(e)) => p.is_match(e),
            (SubscriptionParams::ProcessExecution(p), Event::ProcessExecution(e)) => p.is_match(e),
            (SubscriptionParams::Site(p), Event::Site(e)) => p.is_match(e),
            _ => false,
        }
    }

    /// True if `self` and `event` are the same event-type family. Used by
    /// the dispatcher to distinguish "no match" from "wrong processor".
    pub fn matches_kind(&self, event: &Event) -> bool {
        matches!(
            (self, event),
            (SubscriptionParams::Connection(_), Event::Connection(_))
                | (SubscriptionParams::Emit(_), Event::Emit(_))
                | (SubscriptionParams::EntityChanged(_), Event::EntityChanged(_))
                | (SubscriptionParams::Movement(_), Event::Movement(_))
                | (SubscriptionParams::ProcessExecution(_), Event::ProcessExecution(_))
                | (SubscriptionParams::Site(_), Event::Site(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_params_reject_both_entity_and_site_filters() {
        let params = ConnectionSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 1)])),
            site_ids: Some(HashSet::from([1])),
            ..Default::default()
        };
        assert!(!params.validate());
    }

    #[test]
    fn emit_params_require_source_or_target() {
        assert!(!EmitSubscriptionParams::default().validate());
        let params = EmitSubscriptionParams {
            source_id: Some(Id::new(0, 1)),
            ..Default::default()
        };
        assert!(params.validate());
    }

    #[test]
    fn emit_params_suppress_self_emit() {
        let params = EmitSubscriptionParams {
            target_id: Some(Id::new(0, 2)),
            my_id: Some(Id::new(0, 9)),
            ..Default::default()
        };
        let event = EmitEvent {
            source: Id::new(0, 1),
            target: Id::new(0, 2),
            exclude: Id::new(0, 9),
            text: "hi".into(),
        };
        assert!(!params.is_match(&event));
    }

    #[test]
    fn entity_changed_params_redirect_to_owner() {
        let params = EntityChangedSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 5)])),
            entity_ids_are_owners: true,
            ..Default::default()
        };
        let event = EntityChangedEvent {
            action: EntityChangeAction::Updated,
            id: Id::new(0, 1),
            kind: EntityKind::Thing,
            owner: Id::new(0, 5),
            changed_fields: HashSet::new(),
            flags_added: HashSet::new(),
            flags_removed: HashSet::new(),
            ids_added: HashSet::new(),
            ids_removed: HashSet::new(),
        };
        assert!(params.is_match(&event));
    }

    #[test]
    fn movement_params_site_id_excludes_who_from_to() {
        let params = MovementSubscriptionParams {
            site_id: Some(1),
            who: Some(Id::new(0, 1)),
            ..Default::default()
        };
        assert!(!params.validate());
    }

    #[test]
    fn process_execution_params_match_by_state_set() {
        let params = ProcessExecutionSubscriptionParams {
            states: Some(HashSet::from([ProcessState::Completed])),
            ..Default::default()
        };
        let event = ProcessExecutionEvent {
            pid: 1,
            executable_id: Id::new(0, 1),
            owner_id: Id::new(0, 2),
            process_name: "build".into(),
            state: ProcessState::Completed,
            native: true,
        };
        assert!(params.is_match(&event));
    }
}
