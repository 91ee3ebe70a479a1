//! The attributes shared by every entity variant, plus the per-variant
//! payload, represented as a single struct plus a tagged `EntityPayload`
//! rather than a class hierarchy.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::entity::kind::EntityKind;
use crate::field::FieldTag;
use crate::identifier::Id;

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The attributes every entity variant carries.
#[derive(Debug, Clone)]
pub struct EntityHeader {
    pub id: Id,
    pub kind: EntityKind,
    pub version: u32,
    pub instance: u32,

    pub name: String,
    pub note: String,
    pub registration_name: String,
    pub registration_category: String,

    pub owner: Id,
    pub security_admins: HashSet<Id>,
    pub security_list: HashSet<Id>,

    pub created_timestamp: u64,
    pub updated_timestamp: u64,
    pub accessed_timestamp: u64,
    pub access_count: u64,

    pub flags: HashSet<String>,

    /// Forward containment/program-link ids, valid when `kind.is_container()`.
    pub contained_by: Id,
    pub linked_programs: HashSet<Id>,

    /// referring-entity-id -> set of field tags on that entity pointing here.
    refs_by_source: HashMap<Id, HashSet<FieldTag>>,
    /// field-tag -> set of referring-entity-ids (reverse of the above).
    refs_by_field: HashMap<FieldTag, HashSet<Id>>,

    pub delete_batch_id: u64,
    pub deleted: bool,
}

impl EntityHeader {
    pub fn new(id: Id, kind: EntityKind, owner: Id, name: String) -> Self {
        let now = now_unix_seconds();
        Self {
            id,
            kind,
            version: 1,
            instance: 1,
            name,
            note: String::new(),
            registration_name: String::new(),
            registration_category: String::new(),
            owner,
            security_admins: HashSet::new(),
            security_list: HashSet::new(),
            created_timestamp: now,
            updated_timestamp: now,
            accessed_timestamp: now,
            access_count: 1,
            flags: HashSet::new(),
            contained_by: Id::default(),
            linked_programs: HashSet::new(),
            refs_by_source: HashMap::new(),
            refs_by_field: HashMap::new(),
            delete_batch_id: 0,
            deleted: false,
        }
    }

    /// Records that `source` refers to this entity via `field`. The reverse
    /// half of this (the forward reference on `source` pointing here) is
    /// the caller's responsibility; this only maintains the back-ref table.
    pub fn add_back_ref(&mut self, source: Id, field: FieldTag) {
        self.refs_by_source.entry(source).or_default().insert(field);
        self.refs_by_field.entry(field).or_default().insert(source);
    }

    pub fn remove_back_ref(&mut self, source: Id, field: FieldTag) {
        if let Some(fields) = self.refs_by_source.get_mut(&source) {
            fields.remove(&field);
            if fields.is_empty() {
                self.refs_by_source.remove(&source);
            }
        }
        if let Some(sources) = self.refs_by_field.get_mut(&field) {
            sources.remove(&source);
            if sources.is_empty() {
                self.refs_by_field.remove(&field);
            }
        }
    }

    pub fn refs_from_id(&self, source: Id) -> HashSet<FieldTag> {
        self.refs_by_source.get(&source).cloned().unwrap_or_default()
    }

    pub fn refs_by_field(&self, field: FieldTag) -> HashSet<Id> {
        self.refs_by_field.get(&field).cloned().unwrap_or_default()
    }

    pub fn all_back_ref_sources(&self) -> impl Iterator<Item = (&Id, &HashSet<FieldTag>)> {
        self.refs_by_source.iter()
    }
}

/// Attributes specific to one entity variant. `None` covers every kind that
/// adds nothing beyond the common header (`Entity`, `PropertyEntity`,
/// `ContainerPropertyEntity`, `Region`, `Room`, `Capability`, `Command`).
#[derive(Debug, Clone)]
pub enum EntityPayload {
    None,
    Player {
        home: Id,
    },
    Thing {
        home: Id,
        lock: String,
    },
    Puppet {
        display_name: String,
        controller: Id,
    },
    Vehicle {
        interior: Id,
        controller: Id,
    },
    Group {
        members: HashSet<Id>,
    },
    Program {
        source_code: String,
        compiled_code: Vec<u8>,
        language: String,
        includes: HashSet<Id>,
        runtime_sec: u64,
    },
    /// Covers both `Action` and `Exit`; the exit-only arrival messages are
    /// empty strings for plain actions.
    ActionLike {
        targets: Vec<Id>,
        lock: String,
        success_message: String,
        success_room_message: String,
        fail_message: String,
        fail_room_message: String,
        contained_by: Id,
        commands: Vec<String>,
        arrive_message: String,
        arrive_room_message: String,
    },
}

impl EntityPayload {
    pub fn default_for(kind: EntityKind) -> Self {
        use EntityKind::*;
        match kind {
            Player | Guest => EntityPayload::Player { home: Id::default() },
            Thing => EntityPayload::Thing {
                home: Id::default(),
                lock: String::new(),
            },
            Puppet => EntityPayload::Puppet {
                display_name: String::new(),
                controller: Id::default(),
            },
            Vehicle => EntityPayload::Vehicle {
                interior: Id::default(),
                controller: Id::default(),
            },
            Group => EntityPayload::Group {
                members: HashSet::new(),
            },
            Program => EntityPayload::Program {
                source_code: String::new(),
                compiled_code: Vec::new(),
                language: String::new(),
                includes: HashSet::new(),
                runtime_sec: 0,
            },
            Action | Exit => EntityPayload::ActionLike {
                targets: Vec::new(),
                lock: String::new(),
                success_message: String::new(),
                success_room_message: String::new(),
                fail_message: String::new(),
                fail_room_message: String::new(),
                contained_by: Id::default(),
                commands: Vec::new(),
                arrive_message: String::new(),
                arrive_room_message: String::new(),
            },
            Entity | PropertyEntity | ContainerPropertyEntity | Region | Room | Capability
            | Command => EntityPayload::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_ref_table_is_bidirectional_by_construction() {
        let mut header = EntityHeader::new(Id::new(1, 1), EntityKind::Room, Id::default(), "Room".into());
        let source = Id::new(1, 2);
        header.add_back_ref(source, FieldTag::PlayerHome);
        assert!(header.refs_from_id(source).contains(&FieldTag::PlayerHome));
        assert!(header.refs_by_field(FieldTag::PlayerHome).contains(&source));

        header.remove_back_ref(source, FieldTag::PlayerHome);
        assert!(header.refs_from_id(source).is_empty());
        assert!(header.refs_by_field(FieldTag::PlayerHome).is_empty());
    }

    #[test]
    fn default_payload_matches_kind() {
        assert!(matches!(
            EntityPayload::default_for(EntityKind::Room),
            EntityPayload::None
        ));
        assert!(matches!(
            EntityPayload::default_for(EntityKind::Player),
            EntityPayload::Player { .. }
        ));
        assert!(matches!(
            EntityPayload::default_for(EntityKind::Exit),
            EntityPayload::ActionLike { .. }
        ));
    }
}
