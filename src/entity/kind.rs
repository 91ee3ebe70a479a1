/// Tag identifying which concrete entity variant a record holds.
///
/// Only ever add to this list; entities are persisted with their kind and an
/// old record must keep decoding the same way forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Entity,
    PropertyEntity,
    ContainerPropertyEntity,
    Region,
    Room,
    Player,
    Guest,
    Thing,
    Puppet,
    Vehicle,
    Group,
    Capability,
    Program,
    Action,
    Exit,
    Command,
}

impl EntityKind {
    pub const ALL: [EntityKind; 16] = [
        EntityKind::Entity,
        EntityKind::PropertyEntity,
        EntityKind::ContainerPropertyEntity,
        EntityKind::Region,
        EntityKind::Room,
        EntityKind::Player,
        EntityKind::Guest,
        EntityKind::Thing,
        EntityKind::Puppet,
        EntityKind::Vehicle,
        EntityKind::Group,
        EntityKind::Capability,
        EntityKind::Program,
        EntityKind::Action,
        EntityKind::Exit,
        EntityKind::Command,
    ];

    /// Whether `self` is an action-like entity (Action or Exit, which both
    /// carry the action fields).
    pub fn is_action_like(&self) -> bool {
        matches!(self, EntityKind::Action | EntityKind::Exit)
    }

    /// Whether `self` is a container (has a `contained_by`/`linked_programs`
    /// pair). Scoped to the container property-entity subtree; `Program`,
    /// `Action`, `Exit`, `Capability`, `Command` and `Group` sit outside it
    /// and carry their own, separate field ranges.
    pub fn is_container(&self) -> bool {
        matches!(
            self,
            EntityKind::ContainerPropertyEntity
                | EntityKind::Region
                | EntityKind::Room
                | EntityKind::Player
                | EntityKind::Guest
                | EntityKind::Thing
                | EntityKind::Puppet
                | EntityKind::Vehicle
        )
    }
}
