//! Reference-counted entity handles.
//!
//! A handle keeps the entity pinned in the cache: it is itself an
//! `Arc<Entity>` clone, so `MemoryStore::delete_entity`'s own
//! `Arc::strong_count` check already enforces "no purge while a handle
//! is live" without a separate counter.

use std::sync::Arc;

use crate::entity::Entity;
use crate::identifier::Id;

/// A cheaply-copyable handle to a live cached entity.
#[derive(Clone)]
pub struct EntityRef {
    entity: Arc<Entity>,
}

impl EntityRef {
    pub(crate) fn new(entity: Arc<Entity>) -> Self {
        Self { entity }
    }

    pub fn id(&self) -> Id {
        self.entity.id()
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub(crate) fn arc(&self) -> Arc<Entity> {
        Arc::clone(&self.entity)
    }
}
