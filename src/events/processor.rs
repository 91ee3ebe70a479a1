//! Per-event-type subscription indexes and match evaluation. One
//! [`EventProcessor`] instance backs each event type; the indexed key
//! space (entity id / site id / pid) is the same shape for all six, so
//! a single struct stands in for six otherwise-identical siblings.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::events::event::Event;
use crate::events::subscription_data::{RemovalReason, SubscriptionData, SubscriptionNotification};
use crate::events::subscription_params::SubscriptionParams;
use crate::identifier::{Id, SiteId};

#[derive(Default)]
struct Indexes {
    by_entity: HashMap<Id, HashSet<u64>>,
    by_site: HashMap<SiteId, HashSet<u64>>,
    by_pid: HashMap<u64, u64>,
    global: HashSet<u64>,
}

#[derive(Default)]
pub struct EventProcessor {
    indexes: RwLock<Indexes>,
}

impl EventProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_subscription(&self, id: u64, entity_ids: &[Id], site_ids: &[SiteId], pid: Option<u64>) {
        let mut idx = self.indexes.write().unwrap();
        if entity_ids.is_empty() && site_ids.is_empty() && pid.is_none() {
            idx.global.insert(id);
        }
        for entity_id in entity_ids {
            idx.by_entity.entry(*entity_id).or_default().insert(id);
        }
        for site_id in site_ids {
            idx.by_site.entry(*site_id).or_default().insert(id);
        }
        if let Some(pid) = pid {
            idx.by_pid.insert(pid, id);
        }
    }

    pub fn remove_subscription(&self, id: u64) {
        let mut idx = self.indexes.write().unwrap();
        idx.global.remove(&id);
        idx.by_entity.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
        idx.by_site.retain(|_, ids| {
            ids.remove(&id);
            !ids.is_empty()
        });
        idx.by_pid.retain(|_, sub_id| *sub_id != id);
    }

    fn candidate_ids(&self, entity_ids: &[Id], site_ids: &[SiteId], pid: Option<u64>) -> HashSet<u64> {
        let idx = self.indexes.read().unwrap();
        let mut out: HashSet<u64> = idx.global.iter().copied().collect();
        for entity_id in entity_ids {
            if let Some(set) = idx.by_entity.get(entity_id) {
                out.extend(set.iter().copied());
            }
        }
        for site_id in site_ids {
            if let Some(set) = idx.by_site.get(site_id) {
                out.extend(set.iter().copied());
            }
        }
        if let Some(pid) = pid {
            if let Some(sub_id) = idx.by_pid.get(&pid) {
                out.insert(*sub_id);
            }
        }
        out
    }

    /// Evaluates every indexed candidate exactly once and invokes the
    /// callback of each one whose `is_match` returns true.
    pub fn process_event(&self, event: &Event, data: &SubscriptionData, entity_ids: &[Id], site_ids: &[SiteId], pid: Option<u64>) {
        let mut candidates: Vec<u64> = self.candidate_ids(entity_ids, site_ids, pid).into_iter().collect();
        candidates.sort_unstable();

        let mut satisfied = Vec::new();
        for id in candidates {
            let Some(params) = data.params_of(id) else { continue };
            if params.is_match(event) {
                satisfied.push(id);
            }
        }

        for id in satisfied {
            if let Some(callback) = data.callback_of(id) {
                callback(SubscriptionNotification::Event(event.clone()));
            }
        }
    }

    pub fn entity_deleted(&self, id: Id, data: &SubscriptionData) {
        let affected: Vec<u64> = {
            let idx = self.indexes.read().unwrap();
            idx.by_entity.get(&id).map(|set| set.iter().copied().collect()).unwrap_or_default()
        };
        for sub_id in affected {
            if let Some(callback) = data.callback_of(sub_id) {
                callback(SubscriptionNotification::Removed(RemovalReason::EntityDeleted(id)));
            }
            data.remove(sub_id);
            self.remove_subscription(sub_id);
        }
    }

    pub fn site_deleted(&self, site: SiteId, data: &SubscriptionData) {
        let affected: Vec<u64> = {
            let idx = self.indexes.read().unwrap();
            idx.by_site.get(&site).map(|set| set.iter().copied().collect()).unwrap_or_default()
        };
        for sub_id in affected {
            if let Some(callback) = data.callback_of(sub_id) {
                callback(SubscriptionNotification::Removed(RemovalReason::SiteDeleted(site)));
            }
            data.remove(sub_id);
            self.remove_subscription(sub_id);
        }
    }
}

/// The index keys a subscription's params should be filed under at
/// `add_subscription` time.
pub fn index_keys_for_params(params: &SubscriptionParams) -> (Vec<Id>, Vec<SiteId>, Option<u64>) {
    match params {
        SubscriptionParams::Connection(p) => (
            p.entity_ids.iter().flatten().copied().collect(),
            p.site_ids.iter().flatten().copied().collect(),
            None,
        ),
        SubscriptionParams::Emit(p) => (
            [p.source_id, p.target_id].into_iter().flatten().collect(),
            vec![],
            None,
        ),
        SubscriptionParams::EntityChanged(p) => (
            p.entity_ids.iter().flatten().copied().collect(),
            p.site_ids.iter().flatten().copied().collect(),
            None,
        ),
        SubscriptionParams::Movement(p) => {
            let ids = [p.who, p.from, p.to].into_iter().flatten().collect();
            let sites = p.site_id.into_iter().collect();
            (ids, sites, None)
        }
        SubscriptionParams::ProcessExecution(p) => {
            let ids = [p.executable_id, p.owner_id].into_iter().flatten().collect();
            let sites = [p.executable_site, p.owner_site].into_iter().flatten().collect();
            (ids, sites, p.pid)
        }
        SubscriptionParams::Site(_) => (vec![], vec![], None),
    }
}

/// The index keys an incoming event should be looked up by.
pub fn lookup_keys_for_event(event: &Event) -> (Vec<Id>, Vec<SiteId>, Option<u64>) {
    match event {
        Event::Connection(e) => (vec![e.entity], vec![e.entity.site()], None),
        Event::Emit(e) => (vec![e.source, e.target], vec![], None),
        Event::EntityChanged(e) => (vec![e.id, e.owner], vec![e.id.site(), e.owner.site()], None),
        Event::Movement(e) => (
            vec![e.who, e.from, e.to],
            vec![e.who.site(), e.from.site(), e.to.site()],
            None,
        ),
        Event::ProcessExecution(e) => (
            vec![e.executable_id, e.owner_id],
            vec![e.executable_id.site(), e.owner_id.site()],
            Some(e.pid),
        ),
        Event::Site(e) => (vec![], vec![e.site], None),
    }
}

/// The six per-event-type processor instances, grouped so the dispatcher
/// and the bus can each route by event or params variant without
/// matching six times over.
#[derive(Default)]
pub struct EventProcessors {
    pub connection: EventProcessor,
    pub emit: EventProcessor,
    pub entity_changed: EventProcessor,
    pub movement: EventProcessor,
    pub process_execution: EventProcessor,
    pub site: EventProcessor,
}

impl EventProcessors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_event(&self, event: &Event) -> &EventProcessor {
        match event {
            Event::Connection(_) => &self.connection,
            Event::Emit(_) => &self.emit,
            Event::EntityChanged(_) => &self.entity_changed,
            Event::Movement(_) => &self.movement,
            Event::ProcessExecution(_) => &self.process_execution,
            Event::Site(_) => &self.site,
        }
    }

    pub fn for_params(&self, params: &SubscriptionParams) -> &EventProcessor {
        match params {
            SubscriptionParams::Connection(_) => &self.connection,
            SubscriptionParams::Emit(_) => &self.emit,
            SubscriptionParams::EntityChanged(_) => &self.entity_changed,
            SubscriptionParams::Movement(_) => &self.movement,
            SubscriptionParams::ProcessExecution(_) => &self.process_execution,
            SubscriptionParams::Site(_) => &self.site,
        }
    }

    pub fn all(&self) -> [&EventProcessor; 6] {
        [
            &self.connection,
            &self.emit,
            &self.entity_changed,
            &self.movement,
            &self.process_execution,
            &self.site,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{ConnectionAction, ConnectionEvent};
    use crate::events::subscription_params::ConnectionSubscriptionParams;
    use std::sync::{Arc, Mutex};

    #[test]
    fn matched_subscription_invoked_once() {
        let processor = EventProcessor::new();
        let data = SubscriptionData::new();
        let seen = Arc::new(Mutex::new(0));
        let seen2 = Arc::clone(&seen);

        let params = SubscriptionParams::Connection(ConnectionSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 1)])),
            ..Default::default()
        });
        let id = data.insert(
            params.clone(),
            Arc::new(move |_| {
                *seen2.lock().unwrap() += 1;
            }),
            None,
        );
        let (entity_ids, site_ids, pid) = index_keys_for_params(&params);
        processor.add_subscription(id, &entity_ids, &site_ids, pid);

        let event = Event::Connection(ConnectionEvent {
            action: ConnectionAction::Connect,
            entity: Id::new(0, 1),
            source: "1.2.3.4".into(),
        });
        let (event_ids, event_sites, event_pid) = lookup_keys_for_event(&event);
        processor.process_event(&event, &data, &event_ids, &event_sites, event_pid);

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn entity_deleted_removes_affected_subscription() {
        let processor = EventProcessor::new();
        let data = SubscriptionData::new();
        let params = SubscriptionParams::Connection(ConnectionSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 7)])),
            ..Default::default()
        });
        let id = data.insert(params.clone(), Arc::new(|_| {}), None);
        let (entity_ids, site_ids, pid) = index_keys_for_params(&params);
        processor.add_subscription(id, &entity_ids, &site_ids, pid);

        processor.entity_deleted(Id::new(0, 7), &data);

        assert!(!data.contains(id));
    }
}
