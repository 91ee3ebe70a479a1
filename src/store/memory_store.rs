//! The reference `BackingStore` implementation: entities held in memory
//! behind the same `Arc<Entity>` the cache hands out as reference handles.
//! "Durable" here means "outside cache custody tracking," not persisted to
//! disk — ships both as a working default and as the fixture this crate's
//! own test suite runs against. A custody map guarded by a shared/exclusive
//! lock (reads proceed concurrently, insert/remove take the exclusive
//! side), plus sequential per-site id allocation guarded by a plain `Mutex`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::config::StoreConfig;
use crate::entity::{Entity, EntityKind, ListenerRegistry};
use crate::identifier::{EntityId, Id, SiteId};
use crate::store::backing_store::{BackingStore, NameQuery, SearchCriteria};
use crate::store::error::StoreError;
use crate::store::metadata::EntityMetadata;

struct SiteRecord {
    name: String,
    description: String,
}

pub struct MemoryStore {
    config: Arc<StoreConfig>,
    listeners: Arc<ListenerRegistry>,
    entities: RwLock<HashMap<Id, Arc<Entity>>>,
    sites: Mutex<HashMap<SiteId, SiteRecord>>,
    next_site_id: AtomicU32,
    next_entity_id: Mutex<HashMap<SiteId, EntityId>>,
}

impl MemoryStore {
    pub fn new(config: Arc<StoreConfig>, listeners: Arc<ListenerRegistry>) -> Self {
        Self {
            config,
            listeners,
            entities: RwLock::new(HashMap::new()),
            sites: Mutex::new(HashMap::new()),
            next_site_id: AtomicU32::new(1),
            next_entity_id: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_entity_id(&self, site: SiteId) -> EntityId {
        let mut counters = self.next_entity_id.lock().unwrap();
        let next = counters.entry(site).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }
}

impl BackingStore for MemoryStore {
    fn init(&self) -> Result<(), StoreError> {
        debug!("memory store initialised");
        Ok(())
    }

    fn shutdown(&self) -> Result<(), StoreError> {
        debug!("memory store shut down");
        Ok(())
    }

    fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    fn new_entity(
        &self,
        kind: EntityKind,
        site: SiteId,
        owner: Id,
        name: String,
    ) -> Result<Arc<Entity>, StoreError> {
        let entity_id = self.allocate_entity_id(site);
        let id = Id::new(site, entity_id);
        let entity = Entity::new(
            id,
            kind,
            owner,
            name,
            Arc::clone(&self.config),
            Arc::clone(&self.listeners),
        )
        .map_err(|_| StoreError::AlreadyExists)?;
        let entity = Arc::new(entity);
        self.entities.write().unwrap().insert(id, Arc::clone(&entity));
        Ok(entity)
    }

    fn load_entity(&self, id: Id) -> Option<Arc<Entity>> {
        self.entities.read().unwrap().get(&id).cloned()
    }

    fn save_entity(&self, _entity: &Entity) -> Result<(), StoreError> {
        // The in-memory store's entities are already live in `self.entities`;
        // nothing further needs writing through.
        Ok(())
    }

    fn delete_entity(&self, id: Id) -> Result<(), StoreError> {
        let mut entities = self.entities.write().unwrap();
        match entities.get(&id) {
            None => Err(StoreError::NotFound),
            Some(entity) if Arc::strong_count(entity) > 1 => {
                warn!("delete_entity({id}) refused: entity still has {} live handles", Arc::strong_count(entity));
                Err(StoreError::EntityInUse)
            }
            Some(_) => {
                entities.remove(&id);
                Ok(())
            }
        }
    }

    fn entity_kind_of(&self, id: Id) -> Option<EntityKind> {
        self.entities.read().unwrap().get(&id).map(|e| e.kind())
    }

    fn exists(&self, id: Id) -> bool {
        self.entities.read().unwrap().contains_key(&id)
    }

    fn find_by(&self, criteria: &SearchCriteria) -> Vec<Id> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|entity| entity.id().site() == criteria.site)
            .filter(|entity| criteria.kind.map_or(true, |kind| entity.kind() == kind))
            .filter(|entity| criteria.owner.map_or(true, |owner| entity.get_owner() == owner))
            .filter(|entity| criteria.name.matches(&entity.get_name()))
            .map(|entity| entity.id())
            .collect()
    }

    fn list_site(&self, site: SiteId) -> Vec<Id> {
        self.entities
            .read()
            .unwrap()
            .values()
            .filter(|entity| entity.id().site() == site)
            .map(|entity| entity.id())
            .collect()
    }

    fn find_by_program_registration_name(&self, site: SiteId, name: &str) -> Option<Id> {
        self.entities
            .read()
            .unwrap()
            .values()
            .find(|entity| {
                entity.id().site() == site
                    && entity.kind() == EntityKind::Program
                    && entity.get_registration_name() == name
            })
            .map(|entity| entity.id())
    }

    fn program_registration_name_of(&self, id: Id) -> Option<String> {
        self.entities.read().unwrap().get(&id).map(|e| e.get_registration_name())
    }

    fn metadata_of(&self, ids: &[Id]) -> Vec<EntityMetadata> {
        let entities = self.entities.read().unwrap();
        ids.iter()
            .filter_map(|id| entities.get(id))
            .map(|entity| EntityMetadata {
                id: entity.id(),
                owner: entity.get_owner(),
                kind: entity.kind(),
                version: entity.get_version(),
                name: entity.get_name(),
            })
            .collect()
    }

    fn create_site(&self, name: String) -> SiteId {
        let site = self.next_site_id.fetch_add(1, Ordering::SeqCst);
        self.sites.lock().unwrap().insert(
            site,
            SiteRecord {
                name,
                description: String::new(),
            },
        );
        site
    }

    fn delete_site(&self, site: SiteId) -> Result<(), StoreError> {
        self.sites
            .lock()
            .unwrap()
            .remove(&site)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn site_name(&self, site: SiteId) -> Option<String> {
        self.sites.lock().unwrap().get(&site).map(|r| r.name.clone())
    }

    fn set_site_name(&self, site: SiteId, name: String) {
        if let Some(record) = self.sites.lock().unwrap().get_mut(&site) {
            record.name = name;
        }
    }

    fn site_description(&self, site: SiteId) -> Option<String> {
        self.sites.lock().unwrap().get(&site).map(|r| r.description.clone())
    }

    fn set_site_description(&self, site: SiteId, description: String) {
        if let Some(record) = self.sites.lock().unwrap().get_mut(&site) {
            record.description = description;
        }
    }

    fn list_sites(&self) -> Vec<SiteId> {
        self.sites.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(StoreConfig::default()), Arc::new(ListenerRegistry::new()))
    }

    #[test]
    fn new_entity_allocates_sequential_ids_per_site() {
        let store = store();
        let a = store.new_entity(EntityKind::Thing, 1, Id::default(), "A".into()).unwrap();
        let b = store.new_entity(EntityKind::Thing, 1, Id::default(), "B".into()).unwrap();
        assert_eq!(a.id(), Id::new(1, 1));
        assert_eq!(b.id(), Id::new(1, 2));
    }

    #[test]
    fn delete_refuses_while_handle_is_live() {
        let store = store();
        let entity = store.new_entity(EntityKind::Thing, 1, Id::default(), "Rock".into()).unwrap();
        assert_eq!(store.delete_entity(entity.id()), Err(StoreError::EntityInUse));
        drop(entity);
        assert_eq!(store.delete_entity(Id::new(1, 1)), Ok(()));
    }

    #[test]
    fn find_by_name_substring_is_case_insensitive() {
        let store = store();
        store.new_entity(EntityKind::Thing, 1, Id::default(), "Big Rock".into()).unwrap();
        let results = store.find_by(&SearchCriteria {
            site: 1,
            kind: None,
            owner: None,
            name: NameQuery::Substring("rock".into()),
        });
        assert_eq!(results.len(), 1);
    }
}
