//! The alphabet of entity fields, used by the change journal (`entity::journal`)
//! and by `EntityChangedSubscription`'s changed-field filter.
//! [`FieldTag::valid_for`] replaces compile-time range markers with a
//! runtime lookup built once as a `static` table.

use crate::entity::kind::EntityKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldTag {
    Type,
    Name,
    Note,
    Security,
    Instance,
    Version,
    CreatedTimestamp,
    UpdatedTimestamp,
    AccessedTimestamp,
    AccessCount,
    Owner,
    Flags,
    References,
    DeleteBatchId,
    DeletedFlag,
    RegistrationName,
    RegistrationCategory,

    GroupIds,

    ContainedBy,
    LinkedPrograms,

    PlayerHome,

    ThingHome,
    ThingLock,

    PuppetDisplayName,
    PuppetController,

    VehicleInterior,
    VehicleController,

    ProgramRuntimeSec,
    ProgramRegName,
    ProgramSourceCode,
    ProgramCompiledCode,
    ProgramLanguage,
    ProgramIncludes,

    ActionTargets,
    ActionLock,
    ActionSuccessMessage,
    ActionSuccessRoomMessage,
    ActionFailMessage,
    ActionFailRoomMessage,
    ActionContainedBy,
    ActionCommands,

    ExitArriveMessage,
    ExitArriveRoomMessage,
}

impl FieldTag {
    /// Fields shared by every entity variant.
    const COMMON: &'static [FieldTag] = &[
        FieldTag::Type,
        FieldTag::Name,
        FieldTag::Note,
        FieldTag::Security,
        FieldTag::Instance,
        FieldTag::Version,
        FieldTag::CreatedTimestamp,
        FieldTag::UpdatedTimestamp,
        FieldTag::AccessedTimestamp,
        FieldTag::AccessCount,
        FieldTag::Owner,
        FieldTag::Flags,
        FieldTag::References,
        FieldTag::DeleteBatchId,
        FieldTag::DeletedFlag,
        FieldTag::RegistrationName,
        FieldTag::RegistrationCategory,
    ];

    /// Returns true if this field tag is defined for the given entity kind.
    pub fn valid_for(&self, kind: EntityKind) -> bool {
        if Self::COMMON.contains(self) {
            return true;
        }

        use EntityKind::*;
        match self {
            FieldTag::GroupIds => kind == Group,
            FieldTag::ContainedBy | FieldTag::LinkedPrograms => kind.is_container(),
            FieldTag::PlayerHome => matches!(kind, Player | Guest),
            FieldTag::ThingHome | FieldTag::ThingLock => kind == Thing,
            FieldTag::PuppetDisplayName | FieldTag::PuppetController => kind == Puppet,
            FieldTag::VehicleInterior | FieldTag::VehicleController => kind == Vehicle,
            FieldTag::ProgramRuntimeSec
            | FieldTag::ProgramRegName
            | FieldTag::ProgramSourceCode
            | FieldTag::ProgramCompiledCode
            | FieldTag::ProgramLanguage
            | FieldTag::ProgramIncludes => kind == Program,
            FieldTag::ActionTargets
            | FieldTag::ActionLock
            | FieldTag::ActionSuccessMessage
            | FieldTag::ActionSuccessRoomMessage
            | FieldTag::ActionFailMessage
            | FieldTag::ActionFailRoomMessage
            | FieldTag::ActionContainedBy
            | FieldTag::ActionCommands => kind.is_action_like(),
            FieldTag::ExitArriveMessage | FieldTag::ExitArriveRoomMessage => kind == Exit,
            _ => false,
        }
    }

    /// Fields that hold a single id reference (vs. a list/set).
    pub fn is_single_id_field(&self) -> bool {
        matches!(
            self,
            FieldTag::Owner
                | FieldTag::PlayerHome
                | FieldTag::ThingHome
                | FieldTag::VehicleInterior
                | FieldTag::VehicleController
                | FieldTag::PuppetController
                | FieldTag::ContainedBy
                | FieldTag::ActionContainedBy
        )
    }

    /// Fields that hold a list/set of id references.
    pub fn is_list_id_field(&self) -> bool {
        matches!(
            self,
            FieldTag::GroupIds
                | FieldTag::LinkedPrograms
                | FieldTag::ActionTargets
                | FieldTag::ProgramIncludes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_fields_valid_everywhere() {
        for kind in EntityKind::ALL {
            assert!(FieldTag::Name.valid_for(kind));
            assert!(FieldTag::Owner.valid_for(kind));
        }
    }

    #[test]
    fn variant_fields_scoped_correctly() {
        assert!(FieldTag::PlayerHome.valid_for(EntityKind::Player));
        assert!(!FieldTag::PlayerHome.valid_for(EntityKind::Thing));
        assert!(FieldTag::ActionTargets.valid_for(EntityKind::Action));
        assert!(FieldTag::ActionTargets.valid_for(EntityKind::Exit));
        assert!(!FieldTag::ActionTargets.valid_for(EntityKind::Room));
        assert!(FieldTag::ProgramIncludes.valid_for(EntityKind::Program));
        assert!(!FieldTag::ProgramIncludes.valid_for(EntityKind::Room));
    }

    #[test]
    fn single_vs_list_id_fields_disjoint() {
        for field in [
            FieldTag::Owner,
            FieldTag::PlayerHome,
            FieldTag::ThingHome,
            FieldTag::VehicleInterior,
            FieldTag::VehicleController,
            FieldTag::ContainedBy,
            FieldTag::ActionContainedBy,
        ] {
            assert!(field.is_single_id_field());
            assert!(!field.is_list_id_field());
        }
        for field in [
            FieldTag::GroupIds,
            FieldTag::LinkedPrograms,
            FieldTag::ActionTargets,
            FieldTag::ProgramIncludes,
        ] {
            assert!(field.is_list_id_field());
            assert!(!field.is_single_id_field());
        }
    }
}
