//! The `Entity` type: header + variant payload + lock + journal, tied
//! together with the public API external subsystems use. Each setter is
//! a narrow getter/setter pair over a typed field rather than open field
//! access, recording its own mutation into the journal as it goes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::StoreConfig;
use crate::entity::error::EntityError;
use crate::entity::header::{EntityHeader, EntityPayload};
use crate::entity::journal::Journal;
use crate::entity::kind::EntityKind;
use crate::entity::lock::{EntityLock, Guard};
use crate::entity::listener::ListenerRegistry;
use crate::field::FieldTag;
use crate::identifier::Id;

fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Data held behind the entity's reentrant lock.
struct EntityState {
    header: EntityHeader,
    payload: EntityPayload,
    journal: Journal,
}

/// A typed, versioned record in the store.
pub struct Entity {
    id: Id,
    kind: EntityKind,
    lock: EntityLock<EntityState>,
    listeners: Arc<ListenerRegistry>,
    config: Arc<StoreConfig>,
    dirty: AtomicBool,
}

impl Entity {
    pub fn new(
        id: Id,
        kind: EntityKind,
        owner: Id,
        name: String,
        config: Arc<StoreConfig>,
        listeners: Arc<ListenerRegistry>,
    ) -> Result<Self, EntityError> {
        validate_name(&name, &config)?;
        let header = EntityHeader::new(id, kind, owner, name);
        let payload = EntityPayload::default_for(kind);
        let entity = Self {
            id,
            kind,
            lock: EntityLock::new(EntityState {
                header,
                payload,
                journal: Journal::new(),
            }),
            listeners,
            config,
            dirty: AtomicBool::new(true),
        };
        entity.listeners.notify_created(&entity);
        Ok(entity)
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn lock(&self) -> EntityWriteGuard<'_> {
        EntityWriteGuard {
            entity: self,
            inner: self.lock.lock(),
        }
    }

    pub fn lock_shared(&self) -> EntityReadGuard<'_> {
        EntityReadGuard {
            inner: self.lock.lock_shared(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Called by the Update Manager once a commit has persisted this
    /// entity's pending changes.
    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    // -- convenience single-field operations -------------------------------
    //
    // Each of these takes its own write guard for the duration of the call;
    // use `lock()` directly when several fields must change atomically in
    // one critical section (spec's re-entrant-lock-fan-out scenario).

    pub fn get_name(&self) -> String {
        self.lock_shared().header().name.clone()
    }

    pub fn set_name(&self, name: String) -> Result<(), EntityError> {
        validate_name(&name, &self.config)?;
        let mut guard = self.lock();
        guard.header_mut().name = name;
        guard.journal_mut().mark_changed(FieldTag::Name);
        Ok(())
    }

    pub fn set_note(&self, note: String) -> Result<(), EntityError> {
        validate_string(&note, &self.config)?;
        let mut guard = self.lock();
        guard.header_mut().note = note;
        guard.journal_mut().mark_changed(FieldTag::Note);
        Ok(())
    }

    pub fn set_registration_name(&self, name: String) -> Result<(), EntityError> {
        validate_string(&name, &self.config)?;
        let old = self.get_registration_name();
        if !self.listeners.check_program_registration_name(self, &old, &name) {
            return Err(EntityError::WrongLock);
        }
        let mut guard = self.lock();
        guard.header_mut().registration_name = name;
        guard.journal_mut().mark_changed(FieldTag::RegistrationName);
        Ok(())
    }

    pub fn get_registration_name(&self) -> String {
        self.lock_shared().header().registration_name.clone()
    }

    pub fn get_owner(&self) -> Id {
        self.lock_shared().header().owner
    }

    pub fn get_version(&self) -> u32 {
        self.lock_shared().header().version
    }

    /// Inserts `flag` if absent; a no-op (and no journal entry) if already
    /// set. See the resolved "flag semantics" open question.
    pub fn add_flag(&self, flag: impl Into<String>) {
        let flag = flag.into();
        let mut guard = self.lock();
        if guard.header().flags.contains(&flag) {
            return;
        }
        guard.header_mut().flags.insert(flag.clone());
        guard.journal_mut().add_flag(flag);
    }

    pub fn remove_flag(&self, flag: impl Into<String>) {
        let flag = flag.into();
        let mut guard = self.lock();
        if !guard.header().flags.remove(&flag) {
            return;
        }
        guard.journal_mut().remove_flag(flag);
    }

    /// A pure query: never mutates the flag set or the journal.
    pub fn check_flag(&self, flag: &str) -> bool {
        self.lock_shared().header().flags.contains(flag)
    }

    pub fn refs_from_id(&self, source: Id) -> HashSet<FieldTag> {
        self.lock_shared().header().refs_from_id(source)
    }

    pub fn refs_by_field(&self, field: FieldTag) -> HashSet<Id> {
        self.lock_shared().header().refs_by_field(field)
    }

    /// Records that `source` refers to this entity via `field`. Invoked by
    /// the Update Manager's immediate-queue drain.
    pub fn add_entity_reference(&self, source: Id, field: FieldTag) {
        let mut guard = self.lock();
        guard.header_mut().add_back_ref(source, field);
        guard.journal_mut().mark_changed(FieldTag::References);
    }

    pub fn remove_entity_reference(&self, source: Id, field: FieldTag) {
        let mut guard = self.lock();
        guard.header_mut().remove_back_ref(source, field);
        guard.journal_mut().mark_changed(FieldTag::References);
    }

    /// Sets a single-valued id field (owner, home, contained-by, vehicle
    /// interior/controller, ...). Fails if `field` is not a single-valued
    /// id field for this entity's kind.
    pub fn set_id_field(&self, field: FieldTag, value: Id) -> Result<(), EntityError> {
        if !field.valid_for(self.kind) || !field.is_single_id_field() {
            return Err(EntityError::OutOfRangeField { field });
        }
        let mut guard = self.lock();
        let old = write_single_id_field(&mut guard, field, value)
            .ok_or(EntityError::OutOfRangeField { field })?;
        if old != value {
            guard.journal_mut().remove_id(field, old);
            guard.journal_mut().add_id(field, value);
        }
        Ok(())
    }

    pub fn get_id_field(&self, field: FieldTag) -> Option<Id> {
        let guard = self.lock_shared();
        read_single_id_field(&guard, field)
    }

    pub fn set_player_home(&self, home: Id) -> Result<(), EntityError> {
        self.set_id_field(FieldTag::PlayerHome, home)
    }

    /// Adds `value` to a list/set id field (group members, action targets,
    /// linked programs, program includes).
    pub fn add_id_to_field(&self, field: FieldTag, value: Id) -> Result<(), EntityError> {
        if !field.valid_for(self.kind) || !field.is_list_id_field() {
            return Err(EntityError::OutOfRangeField { field });
        }
        let mut guard = self.lock();
        if insert_list_id_field(&mut guard, field, value) {
            guard.journal_mut().add_id(field, value);
        }
        Ok(())
    }

    pub fn remove_id_from_field(&self, field: FieldTag, value: Id) -> Result<(), EntityError> {
        if !field.valid_for(self.kind) || !field.is_list_id_field() {
            return Err(EntityError::OutOfRangeField { field });
        }
        let mut guard = self.lock();
        if remove_list_id_field(&mut guard, field, value) {
            guard.journal_mut().remove_id(field, value);
        }
        Ok(())
    }

    pub fn add_security_admin(&self, id: Id) {
        let mut guard = self.lock();
        if guard.header_mut().security_admins.insert(id) {
            guard.journal_mut().mark_changed(FieldTag::Security);
        }
    }

    pub fn remove_security_admin(&self, id: Id) {
        let mut guard = self.lock();
        if guard.header_mut().security_admins.remove(&id) {
            guard.journal_mut().mark_changed(FieldTag::Security);
        }
    }

    pub fn add_security_list(&self, id: Id) {
        let mut guard = self.lock();
        if guard.header_mut().security_list.insert(id) {
            guard.journal_mut().mark_changed(FieldTag::Security);
        }
    }

    pub fn remove_security_list(&self, id: Id) {
        let mut guard = self.lock();
        if guard.header_mut().security_list.remove(&id) {
            guard.journal_mut().mark_changed(FieldTag::Security);
        }
    }

    /// Removes `id` from both security collections. Used by the reference
    /// break-source policy when the entity named by `id` is purged.
    pub fn remove_from_security(&self, id: Id) {
        let mut guard = self.lock();
        let removed_admin = guard.header_mut().security_admins.remove(&id);
        let removed_list = guard.header_mut().security_list.remove(&id);
        if removed_admin || removed_list {
            guard.journal_mut().mark_changed(FieldTag::Security);
        }
    }

    /// Clears the entire `program_includes` list. Used by the reference
    /// break-source policy: includes are repopulated on next compile, so
    /// they are cleared wholesale rather than one id at a time.
    pub fn clear_program_includes(&self) {
        let mut guard = self.lock();
        let cleared = match guard.payload_mut() {
            EntityPayload::Program { includes, .. } if !includes.is_empty() => {
                includes.clear();
                true
            }
            _ => false,
        };
        if cleared {
            guard.journal_mut().mark_changed(FieldTag::ProgramIncludes);
        }
    }

    pub fn last_action_target(&self) -> Option<Id> {
        let guard = self.lock_shared();
        match &guard.inner.get().payload {
            EntityPayload::ActionLike { targets, .. } => targets.last().copied(),
            _ => None,
        }
    }

    /// Touches the access counter without advancing `updated_timestamp`.
    pub fn touch_access(&self) {
        let mut guard = self.lock();
        guard.header_mut().accessed_timestamp = now_unix_seconds();
        guard.header_mut().access_count = guard.header().access_count.saturating_add(1);
        guard.journal_mut().mark_changed(FieldTag::AccessedTimestamp);
        guard.journal_mut().mark_changed(FieldTag::AccessCount);
    }

    /// Produces a fresh entity with the same header/payload contents under
    /// a new identity; the clone starts with no back-references and a
    /// fresh journal.
    pub fn clone_as(&self, new_id: Id, new_version: u32, new_instance: u32) -> Self {
        let guard = self.lock_shared();
        let mut header = guard.header().clone();
        header.id = new_id;
        header.version = new_version;
        header.instance = new_instance;
        header.delete_batch_id = 0;
        header.deleted = false;

        Self {
            id: new_id,
            kind: self.kind,
            lock: EntityLock::new(EntityState {
                header,
                payload: guard.inner.get().payload.clone(),
                journal: Journal::new(),
            }),
            listeners: Arc::clone(&self.listeners),
            config: Arc::clone(&self.config),
            dirty: AtomicBool::new(true),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.lock_shared().header().deleted
    }

    pub fn queue_delete(&self, batch_id: u64) {
        let mut guard = self.lock();
        guard.header_mut().deleted = true;
        guard.header_mut().delete_batch_id = batch_id;
        guard.journal_mut().mark_changed(FieldTag::DeletedFlag);
    }

    /// Applies a mutation while bypassing journaling and listener fan-out,
    /// for use only while the entity cache's restore mode is active (bulk
    /// load from the backing store, before any concurrent traffic exists).
    pub fn apply_restored_field<F: FnOnce(&mut EntityHeader, &mut EntityPayload)>(&self, f: F) {
        let mut guard = self.lock.lock();
        let state = guard.get_mut().expect("write guard always yields mutable access");
        f(&mut state.header, &mut state.payload);
    }
}

fn write_single_id_field(guard: &mut EntityWriteGuard<'_>, field: FieldTag, value: Id) -> Option<Id> {
    let state = guard.inner.get_mut().expect("write guard always yields mutable access");
    match (field, &mut state.payload) {
        (FieldTag::Owner, _) => {
            let old = state.header.owner;
            state.header.owner = value;
            Some(old)
        }
        (FieldTag::ContainedBy, _) => {
            let old = state.header.contained_by;
            state.header.contained_by = value;
            Some(old)
        }
        (FieldTag::PlayerHome, EntityPayload::Player { home }) => {
            let old = *home;
            *home = value;
            Some(old)
        }
        (FieldTag::ThingHome, EntityPayload::Thing { home, .. }) => {
            let old = *home;
            *home = value;
            Some(old)
        }
        (FieldTag::VehicleInterior, EntityPayload::Vehicle { interior, .. }) => {
            let old = *interior;
            *interior = value;
            Some(old)
        }
        (FieldTag::VehicleController, EntityPayload::Vehicle { controller, .. }) => {
            let old = *controller;
            *controller = value;
            Some(old)
        }
        (FieldTag::PuppetController, EntityPayload::Puppet { controller, .. }) => {
            let old = *controller;
            *controller = value;
            Some(old)
        }
        (FieldTag::ActionContainedBy, EntityPayload::ActionLike { contained_by, .. }) => {
            let old = *contained_by;
            *contained_by = value;
            Some(old)
        }
        _ => None,
    }
}

fn read_single_id_field(guard: &EntityReadGuard<'_>, field: FieldTag) -> Option<Id> {
    let state = guard.inner.get();
    match (field, &state.payload) {
        (FieldTag::Owner, _) => Some(state.header.owner),
        (FieldTag::ContainedBy, _) => Some(state.header.contained_by),
        (FieldTag::PlayerHome, EntityPayload::Player { home }) => Some(*home),
        (FieldTag::ThingHome, EntityPayload::Thing { home, .. }) => Some(*home),
        (FieldTag::VehicleInterior, EntityPayload::Vehicle { interior, .. }) => Some(*interior),
        (FieldTag::VehicleController, EntityPayload::Vehicle { controller, .. }) => Some(*controller),
        (FieldTag::PuppetController, EntityPayload::Puppet { controller, .. }) => Some(*controller),
        (FieldTag::ActionContainedBy, EntityPayload::ActionLike { contained_by, .. }) => Some(*contained_by),
        _ => None,
    }
}

fn insert_list_id_field(guard: &mut EntityWriteGuard<'_>, field: FieldTag, value: Id) -> bool {
    let state = guard.inner.get_mut().expect("write guard always yields mutable access");
    match (field, &mut state.payload) {
        (FieldTag::GroupIds, EntityPayload::Group { members }) => members.insert(value),
        (FieldTag::LinkedPrograms, _) => state.header.linked_programs.insert(value),
        (FieldTag::ActionTargets, EntityPayload::ActionLike { targets, .. }) => {
            if targets.contains(&value) {
                false
            } else {
                targets.push(value);
                true
            }
        }
        (FieldTag::ProgramIncludes, EntityPayload::Program { includes, .. }) => {
            includes.insert(value)
        }
        _ => false,
    }
}

fn remove_list_id_field(guard: &mut EntityWriteGuard<'_>, field: FieldTag, value: Id) -> bool {
    let state = guard.inner.get_mut().expect("write guard always yields mutable access");
    match (field, &mut state.payload) {
        (FieldTag::GroupIds, EntityPayload::Group { members }) => members.remove(&value),
        (FieldTag::LinkedPrograms, _) => state.header.linked_programs.remove(&value),
        (FieldTag::ActionTargets, EntityPayload::ActionLike { targets, .. }) => {
            let before = targets.len();
            targets.retain(|id| *id != value);
            targets.len() != before
        }
        (FieldTag::ProgramIncludes, EntityPayload::Program { includes, .. }) => {
            includes.remove(&value)
        }
        _ => false,
    }
}

fn validate_name(name: &str, config: &StoreConfig) -> Result<(), EntityError> {
    if name.is_empty() {
        return Err(EntityError::NameEmpty);
    }
    if name.chars().count() > config.limits_entity_name {
        return Err(EntityError::SizeExceeded {
            limit: config.limits_entity_name,
        });
    }
    Ok(())
}

fn validate_string(value: &str, config: &StoreConfig) -> Result<(), EntityError> {
    if value.chars().count() > config.limits_string_size {
        return Err(EntityError::SizeExceeded {
            limit: config.limits_string_size,
        });
    }
    Ok(())
}

/// An exclusive hold on an entity's state. Dropping the outermost instance
/// of this guard runs listener fan-out, while the real lock is still held,
/// and clears the journal.
pub struct EntityWriteGuard<'a> {
    entity: &'a Entity,
    inner: Guard<'a, EntityState>,
}

impl EntityWriteGuard<'_> {
    pub fn header(&self) -> &EntityHeader {
        &self.inner.get().header
    }

    pub fn header_mut(&mut self) -> &mut EntityHeader {
        &mut self
            .inner
            .get_mut()
            .expect("write guard always yields mutable access")
            .header
    }

    pub fn payload(&self) -> &EntityPayload {
        &self.inner.get().payload
    }

    pub fn payload_mut(&mut self) -> &mut EntityPayload {
        &mut self
            .inner
            .get_mut()
            .expect("write guard always yields mutable access")
            .payload
    }

    pub fn journal_mut(&mut self) -> &mut Journal {
        &mut self
            .inner
            .get_mut()
            .expect("write guard always yields mutable access")
            .journal
    }
}

impl Drop for EntityWriteGuard<'_> {
    fn drop(&mut self) {
        if !self.inner.is_outermost_write() {
            return;
        }

        let state = self
            .inner
            .get_mut()
            .expect("write guard always yields mutable access");
        if state.journal.is_empty() {
            return;
        }

        let only_access_fields = state
            .journal
            .changed_fields()
            .iter()
            .all(|f| matches!(f, FieldTag::AccessedTimestamp | FieldTag::AccessCount));
        if !only_access_fields {
            state.header.updated_timestamp = now_unix_seconds();
            state.journal.mark_changed(FieldTag::UpdatedTimestamp);
        }

        let changed_fields = state.journal.changed_fields().clone();
        let flag_delta = state.journal.flag_delta().clone();
        let id_deltas = state.journal.id_deltas().clone();
        state.journal.clear();

        self.entity.dirty.store(true, Ordering::SeqCst);
        self.entity
            .listeners
            .notify_changed(self.entity, &changed_fields, &flag_delta, &id_deltas);
    }
}

/// A shared hold on an entity's state.
pub struct EntityReadGuard<'a> {
    inner: Guard<'a, EntityState>,
}

impl EntityReadGuard<'_> {
    pub fn header(&self) -> &EntityHeader {
        &self.inner.get().header
    }

    pub fn payload(&self) -> &EntityPayload {
        &self.inner.get().payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entity(kind: EntityKind) -> Entity {
        Entity::new(
            Id::new(1, 1),
            kind,
            Id::default(),
            "Rock".into(),
            Arc::new(StoreConfig::default()),
            Arc::new(ListenerRegistry::new()),
        )
        .unwrap()
    }

    #[test]
    fn create_then_query() {
        let entity = test_entity(EntityKind::Thing);
        assert_eq!(entity.get_name(), "Rock");
        assert!(entity.is_dirty());
    }

    #[test]
    fn empty_name_rejected() {
        let result = Entity::new(
            Id::new(1, 1),
            EntityKind::Thing,
            Id::default(),
            String::new(),
            Arc::new(StoreConfig::default()),
            Arc::new(ListenerRegistry::new()),
        );
        assert_eq!(result.unwrap_err(), EntityError::NameEmpty);
    }

    #[test]
    fn touch_access_does_not_advance_updated_timestamp() {
        let entity = test_entity(EntityKind::Thing);
        let updated_before = entity.lock_shared().header().updated_timestamp;
        entity.touch_access();
        let updated_after = entity.lock_shared().header().updated_timestamp;
        assert_eq!(updated_before, updated_after);
    }

    #[test]
    fn set_name_advances_updated_timestamp() {
        let entity = test_entity(EntityKind::Thing);
        entity.set_name("Boulder".into()).unwrap();
        assert_eq!(entity.get_name(), "Boulder");
        assert!(entity.lock_shared().header().created_timestamp <= entity.lock_shared().header().updated_timestamp);
    }

    #[test]
    fn add_flag_then_check_then_remove() {
        let entity = test_entity(EntityKind::Thing);
        assert!(!entity.check_flag("hidden"));
        entity.add_flag("hidden");
        assert!(entity.check_flag("hidden"));
        entity.remove_flag("hidden");
        assert!(!entity.check_flag("hidden"));
    }

    #[test]
    fn check_flag_never_mutates() {
        let entity = test_entity(EntityKind::Thing);
        entity.add_flag("hidden");
        for _ in 0..5 {
            entity.check_flag("hidden");
        }
        assert!(entity.check_flag("hidden"));
    }

    #[test]
    fn reentrant_write_fans_out_once_with_merged_fields() {
        use std::sync::atomic::AtomicUsize;

        struct Counter(AtomicUsize, std::sync::Mutex<HashSet<FieldTag>>);
        impl crate::entity::listener::EntityListener for Counter {
            fn entity_changed(
                &self,
                _entity: &Entity,
                changed_fields: &HashSet<FieldTag>,
                _flag_delta: &crate::entity::journal::SetDelta<String>,
                _id_deltas: &std::collections::HashMap<FieldTag, crate::entity::journal::IdFieldDelta>,
            ) {
                self.0.fetch_add(1, Ordering::SeqCst);
                self.1.lock().unwrap().extend(changed_fields.iter().copied());
            }
            fn entities_deleted(&self, _ids: &HashSet<Id>) {}
            fn site_deleted(&self, _site: crate::identifier::SiteId) {}
        }

        let listeners = Arc::new(ListenerRegistry::new());
        let counter = Arc::new(Counter(AtomicUsize::new(0), std::sync::Mutex::new(HashSet::new())));
        listeners.register(counter.clone() as Arc<dyn crate::entity::listener::EntityListener>);

        let entity = Entity::new(
            Id::new(1, 1),
            EntityKind::Thing,
            Id::default(),
            "Rock".into(),
            Arc::new(StoreConfig::default()),
            listeners,
        )
        .unwrap();

        {
            let mut outer = entity.lock();
            outer.header_mut().note = "a".into();
            outer.journal_mut().mark_changed(FieldTag::Note);
            {
                let mut inner = entity.lock();
                inner.header_mut().registration_name = "b".into();
                inner.journal_mut().mark_changed(FieldTag::RegistrationName);
            }
        }

        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        let fields = counter.1.lock().unwrap();
        assert!(fields.contains(&FieldTag::Note));
        assert!(fields.contains(&FieldTag::RegistrationName));
    }
}
