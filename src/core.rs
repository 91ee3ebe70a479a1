//! The top-level façade wiring the cache, the Update Manager, and the
//! event bus into one handle: cache first (nothing else depends on
//! anything yet), then the Update Manager, then the event bus, each
//! registering itself as a cache listener as it comes up. Torn down in
//! the reverse order by [`Core::shutdown`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::EntityCache;
use crate::config::StoreConfig;
use crate::entity::journal::{IdFieldDelta, SetDelta};
use crate::entity::{Entity, EntityListener};
use crate::events::{Event, EntityChangeAction, EntityChangedEvent, EventBus, SiteAction, SiteEvent};
use crate::field::FieldTag;
use crate::identifier::{Id, SiteId};
use crate::store::BackingStore;
use crate::update_manager::UpdateManagerHandle;

/// Bridges cache fan-out into bus events. Registered as an
/// [`EntityListener`] alongside the Update Manager; the two run
/// independently off the same notification.
struct EventBusListener {
    bus: Arc<EventBus>,
}

impl EntityListener for EventBusListener {
    fn entity_changed(
        &self,
        entity: &Entity,
        changed_fields: &HashSet<FieldTag>,
        flag_delta: &SetDelta<String>,
        id_deltas: &HashMap<FieldTag, IdFieldDelta>,
    ) {
        let mut ids_added = HashSet::new();
        let mut ids_removed = HashSet::new();
        for delta in id_deltas.values() {
            ids_added.extend(delta.added.iter().copied());
            ids_removed.extend(delta.removed.iter().copied());
        }

        self.bus.publish(Event::EntityChanged(EntityChangedEvent {
            action: EntityChangeAction::Updated,
            id: entity.id(),
            kind: entity.kind(),
            owner: entity.get_owner(),
            changed_fields: changed_fields.clone(),
            flags_added: flag_delta.added.clone(),
            flags_removed: flag_delta.removed.clone(),
            ids_added,
            ids_removed,
        }));
    }

    fn entity_created(&self, entity: &Entity) {
        self.bus.publish(Event::EntityChanged(EntityChangedEvent {
            action: EntityChangeAction::Created,
            id: entity.id(),
            kind: entity.kind(),
            owner: entity.get_owner(),
            changed_fields: HashSet::new(),
            flags_added: HashSet::new(),
            flags_removed: HashSet::new(),
            ids_added: HashSet::new(),
            ids_removed: HashSet::new(),
        }));
    }

    fn entities_deleted(&self, ids: &HashSet<Id>) {
        for id in ids {
            self.bus.publish(Event::EntityChanged(EntityChangedEvent {
                action: EntityChangeAction::Deleted,
                id: *id,
                kind: crate::entity::EntityKind::Entity,
                owner: Id::default(),
                changed_fields: HashSet::new(),
                flags_added: HashSet::new(),
                flags_removed: HashSet::new(),
                ids_added: HashSet::new(),
                ids_removed: HashSet::new(),
            }));
        }
    }

    fn site_deleted(&self, site: SiteId) {
        self.bus.publish(Event::Site(SiteEvent {
            action: SiteAction::Deleted,
            site,
        }));
    }
}

/// Owns every long-lived subsystem: the cache, the committer thread, and
/// the dispatch thread. Dropping a `Core` without calling
/// [`Core::shutdown`] leaves both background threads running detached,
/// matching the explicit-shutdown pattern the rest of this crate uses
/// for its background workers.
pub struct Core {
    cache: Arc<EntityCache>,
    update_manager: Option<UpdateManagerHandle>,
    event_bus: Arc<EventBus>,
}

impl Core {
    pub fn new(config: Arc<StoreConfig>, store: Arc<dyn BackingStore>) -> Self {
        let listeners = Arc::clone(store.listeners());
        let cache = Arc::new(EntityCache::new(store, listeners));

        let update_manager = UpdateManagerHandle::start(Arc::clone(&cache), config.commit_interval);

        let event_bus = Arc::new(EventBus::new());
        cache.add_entity_listener(Arc::new(EventBusListener {
            bus: Arc::clone(&event_bus),
        }));

        Self {
            cache,
            update_manager: Some(update_manager),
            event_bus,
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Tears down the committer thread, then the dispatch thread, in the
    /// reverse of construction order.
    pub fn shutdown(mut self) {
        if let Some(update_manager) = self.update_manager.take() {
            update_manager.shutdown();
        }
        self.event_bus.shutdown();
    }
}
