//! Bulk metadata fetch return shape.

use crate::entity::EntityKind;
use crate::identifier::Id;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub id: Id,
    pub owner: Id,
    pub kind: EntityKind,
    pub version: u32,
    pub name: String,
}
