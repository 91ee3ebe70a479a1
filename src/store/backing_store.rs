//! The durable-store interface. Implementors provide optimised structures;
//! the cache provides memoisation. Exact on-disk layout is the
//! implementor's business — this crate only fixes the contract.

use std::sync::Arc;

use crate::entity::{Entity, EntityKind, ListenerRegistry};
use crate::identifier::{Id, SiteId};
use crate::store::error::StoreError;
use crate::store::metadata::EntityMetadata;

/// How `find_by` should match the `name` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameQuery {
    Any,
    Exact(String),
    Substring(String),
}

impl NameQuery {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameQuery::Any => true,
            NameQuery::Exact(expected) => name == expected,
            NameQuery::Substring(needle) => {
                name.to_lowercase().contains(&needle.to_lowercase())
            }
        }
    }
}

/// Criteria for `BackingStore::find_by`. Any `None`/`Any` field is a
/// wildcard.
#[derive(Debug, Clone)]
pub struct SearchCriteria {
    pub site: SiteId,
    pub kind: Option<EntityKind>,
    pub owner: Option<Id>,
    pub name: NameQuery,
}

pub trait BackingStore: Send + Sync {
    fn init(&self) -> Result<(), StoreError>;
    fn shutdown(&self) -> Result<(), StoreError>;

    /// The listener registry entities created by this store report to.
    /// Callers that build their own `EntityCache` on top of a store must
    /// reuse this same registry rather than constructing a fresh one, or
    /// cache-level listeners (the Update Manager, the event bus) would
    /// never hear about entity changes.
    fn listeners(&self) -> &Arc<ListenerRegistry>;

    /// Allocates a fresh id, materialises a fresh entity, and hands it to
    /// the caller (the cache takes custody immediately).
    fn new_entity(
        &self,
        kind: EntityKind,
        site: SiteId,
        owner: Id,
        name: String,
    ) -> Result<Arc<Entity>, StoreError>;

    fn load_entity(&self, id: Id) -> Option<Arc<Entity>>;
    fn save_entity(&self, entity: &Entity) -> Result<(), StoreError>;

    /// Fails with [`StoreError::EntityInUse`] if any live handle exists.
    fn delete_entity(&self, id: Id) -> Result<(), StoreError>;

    fn entity_kind_of(&self, id: Id) -> Option<EntityKind>;
    fn exists(&self, id: Id) -> bool;

    fn find_by(&self, criteria: &SearchCriteria) -> Vec<Id>;
    fn list_site(&self, site: SiteId) -> Vec<Id>;

    fn find_by_program_registration_name(&self, site: SiteId, name: &str) -> Option<Id>;
    fn program_registration_name_of(&self, id: Id) -> Option<String>;

    /// Missing entries are omitted from the result, not padded with `None`.
    fn metadata_of(&self, ids: &[Id]) -> Vec<EntityMetadata>;

    fn create_site(&self, name: String) -> SiteId;
    fn delete_site(&self, site: SiteId) -> Result<(), StoreError>;
    fn site_name(&self, site: SiteId) -> Option<String>;
    fn set_site_name(&self, site: SiteId, name: String);
    fn site_description(&self, site: SiteId) -> Option<String>;
    fn set_site_description(&self, site: SiteId, description: String);
    fn list_sites(&self) -> Vec<SiteId>;
}
