//! Purge-time reference cleanup.

use std::collections::HashSet;

use log::error;

use crate::cache::EntityCache;
use crate::entity::{Entity, EntityPayload};
use crate::field::FieldTag;
use crate::identifier::Id;

/// Runs the full purge-time reference cleanup for `target`: clears every
/// outbound reference `target` holds, and applies the break-source policy
/// to every entity that references `target`.
pub fn remove_all_references(target: &Entity, cache: &EntityCache) {
    for (field, referenced) in collect_outbound_refs(target) {
        if let Some(handle) = cache.get_including_deleted(referenced) {
            handle.entity().remove_entity_reference(target.id(), field);
        }
    }

    let sources: Vec<(Id, HashSet<FieldTag>)> = {
        let guard = target.lock_shared();
        guard
            .header()
            .all_back_ref_sources()
            .map(|(id, fields)| (*id, fields.clone()))
            .collect()
    };

    for (source_id, fields) in sources {
        if let Some(handle) = cache.get_including_deleted(source_id) {
            for field in fields {
                break_source(handle.entity(), field, target.id());
            }
        }
    }
}

fn collect_outbound_refs(target: &Entity) -> Vec<(FieldTag, Id)> {
    let guard = target.lock_shared();
    let header = guard.header();

    let mut refs: Vec<(FieldTag, Id)> = vec![(FieldTag::Owner, header.owner)];
    refs.extend(header.security_admins.iter().map(|id| (FieldTag::Security, *id)));
    refs.extend(header.security_list.iter().map(|id| (FieldTag::Security, *id)));

    if target.kind().is_container() {
        refs.push((FieldTag::ContainedBy, header.contained_by));
        refs.extend(header.linked_programs.iter().map(|id| (FieldTag::LinkedPrograms, *id)));
    }

    match guard.payload() {
        EntityPayload::None => {}
        EntityPayload::Player { home } => refs.push((FieldTag::PlayerHome, *home)),
        EntityPayload::Thing { home, .. } => refs.push((FieldTag::ThingHome, *home)),
        EntityPayload::Puppet { controller, .. } => refs.push((FieldTag::PuppetController, *controller)),
        EntityPayload::Vehicle { interior, controller } => {
            refs.push((FieldTag::VehicleInterior, *interior));
            refs.push((FieldTag::VehicleController, *controller));
        }
        EntityPayload::Group { members } => {
            refs.extend(members.iter().map(|id| (FieldTag::GroupIds, *id)));
        }
        EntityPayload::Program { includes, .. } => {
            refs.extend(includes.iter().map(|id| (FieldTag::ProgramIncludes, *id)));
        }
        EntityPayload::ActionLike { targets, contained_by, .. } => {
            refs.push((FieldTag::ActionContainedBy, *contained_by));
            refs.extend(targets.iter().map(|id| (FieldTag::ActionTargets, *id)));
        }
    }

    refs.into_iter().filter(|(_, id)| !id.is_default()).collect()
}

/// Applies the break-source policy on `source`, which referenced `target`
/// via `field`.
fn break_source(source: &Entity, field: FieldTag, target: Id) {
    if field == FieldTag::Security {
        source.remove_from_security(target);
        return;
    }
    if field.is_single_id_field() {
        let _ = source.set_id_field(field, Id::default());
        return;
    }
    if field.is_list_id_field() {
        if field == FieldTag::ProgramIncludes {
            source.clear_program_includes();
        } else {
            let _ = source.remove_id_from_field(field, target);
        }
        return;
    }
    error!("remove-all-references: unknown field tag {field:?} on source, skipping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::{EntityKind, ListenerRegistry};
    use crate::store::{BackingStore, MemoryStore};
    use std::sync::Arc;

    fn cache() -> EntityCache {
        let listeners = Arc::new(ListenerRegistry::new());
        let store: Arc<dyn BackingStore> = Arc::new(MemoryStore::new(
            Arc::new(StoreConfig::default()),
            Arc::clone(&listeners),
        ));
        EntityCache::new(store, listeners)
    }

    #[test]
    fn purging_a_home_breaks_the_players_home_field() {
        let cache = cache();
        let player = cache
            .store()
            .new_entity(EntityKind::Player, 1, Id::default(), "Hero".into())
            .unwrap();
        let room = cache
            .store()
            .new_entity(EntityKind::Room, 1, Id::default(), "Square".into())
            .unwrap();

        player.set_player_home(room.id()).unwrap();
        room.add_entity_reference(player.id(), FieldTag::PlayerHome);

        remove_all_references(&room, &cache);

        assert_eq!(player.get_id_field(FieldTag::PlayerHome), Some(Id::default()));
    }

    #[test]
    fn purging_a_target_removes_it_from_action_targets() {
        let cache = cache();
        let action = cache
            .store()
            .new_entity(EntityKind::Action, 1, Id::default(), "Push".into())
            .unwrap();
        let thing = cache
            .store()
            .new_entity(EntityKind::Thing, 1, Id::default(), "Boulder".into())
            .unwrap();

        action.add_id_to_field(FieldTag::ActionTargets, thing.id()).unwrap();
        thing.add_entity_reference(action.id(), FieldTag::ActionTargets);

        remove_all_references(&thing, &cache);

        let guard = action.lock_shared();
        match guard.payload() {
            EntityPayload::ActionLike { targets, .. } => assert!(!targets.contains(&thing.id())),
            _ => panic!("expected ActionLike payload"),
        }
        drop(guard);
        assert_eq!(action.refs_by_field(FieldTag::ActionTargets).len(), 0);
    }
}
