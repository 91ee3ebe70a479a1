//! The entity cache: a thin façade over the backing store that hands out
//! reference handles and owns the process-wide listener registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;

use crate::cache::entity_ref::EntityRef;
use crate::entity::EntityListener;
use crate::identifier::{Id, SiteId};
use crate::entity::ListenerRegistry;
use crate::store::{BackingStore, StoreError};

pub struct EntityCache {
    store: Arc<dyn BackingStore>,
    listeners: Arc<ListenerRegistry>,
    /// Suppresses dirty-marking and listener fan-out while the store is
    /// being bulk-loaded. One-way: once cleared it cannot be re-enabled.
    restore_mode: AtomicBool,
    restore_mode_exited: AtomicBool,
}

impl EntityCache {
    pub fn new(store: Arc<dyn BackingStore>, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            store,
            listeners,
            restore_mode: AtomicBool::new(false),
            restore_mode_exited: AtomicBool::new(false),
        }
    }

    pub fn begin_restore_mode(&self) {
        if self.restore_mode_exited.load(Ordering::SeqCst) {
            warn!("ignoring attempt to re-enter restore mode after it was exited");
            return;
        }
        self.restore_mode.store(true, Ordering::SeqCst);
    }

    /// One-way: once restore mode is exited it cannot be re-entered.
    pub fn end_restore_mode(&self) {
        self.restore_mode.store(false, Ordering::SeqCst);
        self.restore_mode_exited.store(true, Ordering::SeqCst);
    }

    pub fn is_restore_mode(&self) -> bool {
        self.restore_mode.load(Ordering::SeqCst)
    }

    /// Looks the entity up, refusing one that has been queued for
    /// deletion.
    pub fn get(&self, id: Id) -> Option<EntityRef> {
        let entity = self.store.load_entity(id)?;
        if entity.is_deleted() {
            return None;
        }
        Some(EntityRef::new(entity))
    }

    pub fn get_including_deleted(&self, id: Id) -> Option<EntityRef> {
        self.store.load_entity(id).map(EntityRef::new)
    }

    pub fn internal_commit_entity(&self, handle: &EntityRef) -> Result<(), StoreError> {
        self.store.save_entity(handle.entity())?;
        handle.entity().clear_dirty();
        Ok(())
    }

    /// Attempts to purge `id`. Returns `Err(StoreError::EntityInUse)` if any
    /// handle is still outstanding; the caller (the Update Manager) is
    /// expected to re-queue on that outcome.
    pub fn internal_delete_entity(&self, id: Id) -> Result<(), StoreError> {
        self.store.delete_entity(id)
    }

    /// Marks every live entity in `site` as queued for deletion and tells
    /// every listener the site itself is going away, which is what gets
    /// the Update Manager tracking it for its final `BackingStore::delete_site`
    /// call once every entity in it is gone.
    pub fn delete_site(&self, site: SiteId, batch_id: u64) {
        for id in self.store.list_site(site) {
            if let Some(entity) = self.store.load_entity(id) {
                entity.queue_delete(batch_id);
            }
        }
        self.listeners.notify_site_deleted(site);
    }

    pub fn add_entity_listener(&self, listener: Arc<dyn EntityListener>) {
        self.listeners.register(listener);
    }

    pub fn remove_entity_listener(&self, listener: &Arc<dyn EntityListener>) {
        self.listeners.unregister(listener);
    }

    pub fn store(&self) -> &Arc<dyn BackingStore> {
        &self.store
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::EntityKind;
    use crate::store::MemoryStore;

    fn cache() -> EntityCache {
        let listeners = Arc::new(ListenerRegistry::new());
        let store: Arc<dyn BackingStore> = Arc::new(MemoryStore::new(
            Arc::new(StoreConfig::default()),
            Arc::clone(&listeners),
        ));
        EntityCache::new(store, listeners)
    }

    #[test]
    fn get_refuses_deleted_entity() {
        let cache = cache();
        let entity = cache
            .store()
            .new_entity(EntityKind::Thing, 1, Id::default(), "Rock".into())
            .unwrap();
        entity.queue_delete(1);
        assert!(cache.get(entity.id()).is_none());
        assert!(cache.get_including_deleted(entity.id()).is_some());
    }

    #[test]
    fn restore_mode_is_one_way() {
        let cache = cache();
        cache.begin_restore_mode();
        assert!(cache.is_restore_mode());
        cache.end_restore_mode();
        assert!(!cache.is_restore_mode());
        cache.begin_restore_mode();
        assert!(!cache.is_restore_mode());
    }

    #[test]
    fn delete_refused_while_handle_outstanding() {
        let cache = cache();
        let handle = cache
            .get(
                cache
                    .store()
                    .new_entity(EntityKind::Thing, 1, Id::default(), "Rock".into())
                    .unwrap()
                    .id(),
            )
            .unwrap();
        assert_eq!(
            cache.internal_delete_entity(handle.id()),
            Err(StoreError::EntityInUse)
        );
    }
}
