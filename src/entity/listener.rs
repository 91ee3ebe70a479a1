//! Process-wide entity change listener registry: a lifecycle-scoped
//! registry, initialised before mutation traffic begins and read without
//! its own lock thereafter. Kept behind a `RwLock` rather than left
//! unsynchronised, since nothing in this crate can enforce the
//! "no registration after startup" convention at compile time.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::entity::journal::{IdFieldDelta, SetDelta};
use crate::entity::Entity;
use crate::field::FieldTag;
use crate::identifier::{Id, SiteId};

/// Callback interface invoked on entity lifecycle events. Implementors are
/// registered once at startup (the Update Manager and the Event Bus each
/// register themselves as one).
pub trait EntityListener: Send + Sync {
    /// Called once per outermost-writer-release that produced a non-empty
    /// journal, with the merged deltas since the previous fan-out.
    fn entity_changed(
        &self,
        entity: &Entity,
        changed_fields: &HashSet<FieldTag>,
        flag_delta: &SetDelta<String>,
        id_deltas: &HashMap<FieldTag, IdFieldDelta>,
    );

    /// Called once, right after a new entity is constructed. Default: no-op.
    fn entity_created(&self, _entity: &Entity) {}

    /// Called once a batch of entities has been purged.
    fn entities_deleted(&self, ids: &HashSet<Id>);

    /// Called once a site and everything in it has been purged.
    fn site_deleted(&self, site: SiteId);

    /// Optional veto hook consulted before a program's registration name is
    /// changed. Returning `false` rejects the rename. Default: always allow.
    fn check_program_registration_name(
        &self,
        _entity: &Entity,
        _old_name: &str,
        _new_name: &str,
    ) -> bool {
        true
    }
}

/// The process-wide registry of listeners, owned by [`crate::core::Core`]
/// and handed to the cache at construction.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<std::sync::Arc<dyn EntityListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: std::sync::Arc<dyn EntityListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Drops every listener whose `Arc` pointer matches `listener`.
    pub fn unregister(&self, listener: &std::sync::Arc<dyn EntityListener>) {
        let mut listeners = self.listeners.write().unwrap();
        listeners.retain(|l| !std::sync::Arc::ptr_eq(l, listener));
    }

    pub fn notify_changed(
        &self,
        entity: &Entity,
        changed_fields: &HashSet<FieldTag>,
        flag_delta: &SetDelta<String>,
        id_deltas: &HashMap<FieldTag, IdFieldDelta>,
    ) {
        for listener in self.listeners.read().unwrap().iter() {
            listener.entity_changed(entity, changed_fields, flag_delta, id_deltas);
        }
    }

    pub fn notify_created(&self, entity: &Entity) {
        for listener in self.listeners.read().unwrap().iter() {
            listener.entity_created(entity);
        }
    }

    pub fn notify_deleted(&self, ids: &HashSet<Id>) {
        for listener in self.listeners.read().unwrap().iter() {
            listener.entities_deleted(ids);
        }
    }

    pub fn notify_site_deleted(&self, site: SiteId) {
        for listener in self.listeners.read().unwrap().iter() {
            listener.site_deleted(site);
        }
    }

    pub fn check_program_registration_name(
        &self,
        entity: &Entity,
        old_name: &str,
        new_name: &str,
    ) -> bool {
        self.listeners
            .read()
            .unwrap()
            .iter()
            .all(|l| l.check_program_registration_name(entity, old_name, new_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingListener {
        count: AtomicUsize,
    }

    impl EntityListener for CountingListener {
        fn entity_changed(
            &self,
            _entity: &Entity,
            _changed_fields: &HashSet<FieldTag>,
            _flag_delta: &SetDelta<String>,
            _id_deltas: &HashMap<FieldTag, IdFieldDelta>,
        ) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }

        fn entities_deleted(&self, _ids: &HashSet<Id>) {}
        fn site_deleted(&self, _site: SiteId) {}
    }

    #[test]
    fn unregister_removes_only_that_listener() {
        let registry = ListenerRegistry::new();
        let a: Arc<dyn EntityListener> = Arc::new(CountingListener {
            count: AtomicUsize::new(0),
        });
        let b: Arc<dyn EntityListener> = Arc::new(CountingListener {
            count: AtomicUsize::new(0),
        });
        registry.register(Arc::clone(&a));
        registry.register(Arc::clone(&b));
        registry.unregister(&a);
        assert_eq!(registry.listeners.read().unwrap().len(), 1);
    }
}
