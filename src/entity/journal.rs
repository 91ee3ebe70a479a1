//! Per-entity accumulated delta since the last listener fan-out.

use std::collections::{HashMap, HashSet};

use crate::field::FieldTag;
use crate::identifier::Id;

/// Added/removed halves of a set-valued delta, with cancellation: adding
/// something already in `removed` cancels it out of `removed` rather than
/// also appearing in `added`, and vice versa.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDelta<T: Eq + std::hash::Hash + Clone> {
    pub removed: HashSet<T>,
    pub added: HashSet<T>,
}

impl<T: Eq + std::hash::Hash + Clone> SetDelta<T> {
    pub fn add(&mut self, value: T) {
        if !self.removed.remove(&value) {
            self.added.insert(value);
        }
    }

    pub fn remove(&mut self, value: T) {
        if !self.added.remove(&value) {
            self.removed.insert(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn clear(&mut self) {
        self.added.clear();
        self.removed.clear();
    }

    fn merge_from(&mut self, other: &SetDelta<T>) {
        for value in &other.removed {
            self.remove(value.clone());
        }
        for value in &other.added {
            self.add(value.clone());
        }
    }
}

/// Id delta for a single field. For single-valued id fields the `added` set
/// collapses to at most one element (the latest value); the first-seen
/// `removed` value is kept regardless of how many subsequent values pass
/// through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdFieldDelta {
    pub removed: HashSet<Id>,
    pub added: HashSet<Id>,
    single_valued: bool,
}

impl IdFieldDelta {
    pub fn new(single_valued: bool) -> Self {
        Self {
            removed: HashSet::new(),
            added: HashSet::new(),
            single_valued,
        }
    }

    pub fn add(&mut self, value: Id) {
        if self.removed.remove(&value) {
            return;
        }
        if self.single_valued {
            self.added.clear();
        }
        self.added.insert(value);
    }

    pub fn remove(&mut self, value: Id) {
        if self.added.remove(&value) {
            return;
        }
        self.removed.insert(value);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    fn merge_from(&mut self, other: &IdFieldDelta) {
        for value in &other.removed {
            self.remove(*value);
        }
        for value in &other.added {
            self.add(*value);
        }
    }
}

/// The three deltas an `Entity` accumulates between listener fan-outs:
/// changed fields, flag add/remove, and per-field id add/remove.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    changed_fields: HashSet<FieldTag>,
    flags: SetDelta<String>,
    ids: HashMap<FieldTag, IdFieldDelta>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a `Journal` from the pieces an `EntityListener::entity_changed`
    /// call receives. Used by the Update Manager, which only sees the
    /// already-split deltas rather than the entity's own `Journal` value.
    pub fn from_parts(
        changed_fields: HashSet<FieldTag>,
        flags: SetDelta<String>,
        ids: HashMap<FieldTag, IdFieldDelta>,
    ) -> Self {
        Self {
            changed_fields,
            flags,
            ids,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_fields.is_empty()
    }

    pub fn mark_changed(&mut self, field: FieldTag) {
        self.changed_fields.insert(field);
    }

    pub fn changed_fields(&self) -> &HashSet<FieldTag> {
        &self.changed_fields
    }

    pub fn add_flag(&mut self, flag: impl Into<String>) {
        self.flags.add(flag.into());
        self.mark_changed(FieldTag::Flags);
    }

    pub fn remove_flag(&mut self, flag: impl Into<String>) {
        self.flags.remove(flag.into());
        self.mark_changed(FieldTag::Flags);
    }

    pub fn flag_delta(&self) -> &SetDelta<String> {
        &self.flags
    }

    pub fn add_id(&mut self, field: FieldTag, value: Id) {
        self.ids
            .entry(field)
            .or_insert_with(|| IdFieldDelta::new(field.is_single_id_field()))
            .add(value);
        self.mark_changed(field);
    }

    pub fn remove_id(&mut self, field: FieldTag, value: Id) {
        self.ids
            .entry(field)
            .or_insert_with(|| IdFieldDelta::new(field.is_single_id_field()))
            .remove(value);
        self.mark_changed(field);
    }

    pub fn id_deltas(&self) -> &HashMap<FieldTag, IdFieldDelta> {
        &self.ids
    }

    /// Takes every id-field delta out of this journal, leaving the rest
    /// (changed fields, flags) intact. Used by the Update Manager's
    /// immediate-queue drain, which processes id deltas promptly but merges
    /// everything else into the next commit.
    pub fn take_id_deltas(&mut self) -> HashMap<FieldTag, IdFieldDelta> {
        std::mem::take(&mut self.ids)
    }

    pub fn clear(&mut self) {
        self.changed_fields.clear();
        self.flags.clear();
        self.ids.clear();
    }

    /// Merges `other` into `self`, used when coalescing a freshly-fanned-out
    /// change into the pending-updates map ahead of the next commit tick.
    pub fn merge(&mut self, other: &Journal) {
        self.changed_fields
            .extend(other.changed_fields.iter().copied());
        self.flags.merge_from(&other.flags);
        for (field, delta) in &other.ids {
            self.ids
                .entry(*field)
                .or_insert_with(|| IdFieldDelta::new(delta.single_valued))
                .merge_from(delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_delta_cancels_add_then_remove() {
        let mut delta: SetDelta<String> = SetDelta::default();
        delta.add("wizard".to_string());
        delta.remove("wizard".to_string());
        assert!(delta.is_empty());
    }

    #[test]
    fn set_delta_cancels_remove_then_add() {
        let mut delta: SetDelta<String> = SetDelta::default();
        delta.remove("wizard".to_string());
        delta.add("wizard".to_string());
        assert!(delta.is_empty());
    }

    #[test]
    fn set_delta_keeps_net_add() {
        let mut delta: SetDelta<String> = SetDelta::default();
        delta.add("wizard".to_string());
        assert!(delta.added.contains("wizard"));
        assert!(delta.removed.is_empty());
    }

    #[test]
    fn id_delta_single_valued_collapses_to_latest() {
        let mut delta = IdFieldDelta::new(true);
        delta.add(Id::new(1, 10));
        delta.add(Id::new(1, 11));
        assert_eq!(delta.added.len(), 1);
        assert!(delta.added.contains(&Id::new(1, 11)));
    }

    #[test]
    fn id_delta_cancels_add_then_remove() {
        let mut delta = IdFieldDelta::new(false);
        delta.add(Id::new(1, 10));
        delta.remove(Id::new(1, 10));
        assert!(delta.is_empty());
    }

    #[test]
    fn journal_merge_accumulates_across_critical_sections() {
        let mut base = Journal::new();
        base.mark_changed(FieldTag::Name);

        let mut next = Journal::new();
        next.add_id(FieldTag::PlayerHome, Id::new(1, 5));

        base.merge(&next);
        assert!(base.changed_fields().contains(&FieldTag::Name));
        assert!(base.changed_fields().contains(&FieldTag::PlayerHome));
        assert!(base.id_deltas()[&FieldTag::PlayerHome]
            .added
            .contains(&Id::new(1, 5)));
    }

    #[test]
    fn take_id_deltas_leaves_other_fields_intact() {
        let mut journal = Journal::new();
        journal.mark_changed(FieldTag::Name);
        journal.add_id(FieldTag::PlayerHome, Id::new(1, 5));

        let taken = journal.take_id_deltas();
        assert!(taken.contains_key(&FieldTag::PlayerHome));
        assert!(journal.id_deltas().is_empty());
        assert!(journal.changed_fields().contains(&FieldTag::Name));
    }
}
