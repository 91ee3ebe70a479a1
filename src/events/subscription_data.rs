//! Central subscription registry: id allocation and subscriber records.
//! Reads (matching) take the shared side of the lock; add/remove take
//! the exclusive side.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::events::event::Event;
use crate::events::subscription_params::SubscriptionParams;
use crate::identifier::{Id, SiteId};

#[derive(Debug, Clone, Copy)]
pub enum RemovalReason {
    EntityDeleted(Id),
    SiteDeleted(SiteId),
    ProcessCompleted(u64),
}

#[derive(Debug, Clone)]
pub enum SubscriptionNotification {
    Event(Event),
    Removed(RemovalReason),
}

pub type SubscriptionCallback = Arc<dyn Fn(SubscriptionNotification) + Send + Sync>;

pub struct SubscriptionRecord {
    pub params: SubscriptionParams,
    pub callback: SubscriptionCallback,
    pub owner_pid: Option<u64>,
}

#[derive(Default)]
pub struct SubscriptionData {
    next_id: AtomicU64,
    records: RwLock<HashMap<u64, SubscriptionRecord>>,
}

impl SubscriptionData {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Allocates the next monotonic id and records the subscription.
    /// Returns 0 never; id 0 is reserved by callers for "subscribe failed".
    pub fn insert(&self, params: SubscriptionParams, callback: SubscriptionCallback, owner_pid: Option<u64>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.records.write().unwrap().insert(
            id,
            SubscriptionRecord {
                params,
                callback,
                owner_pid,
            },
        );
        id
    }

    pub fn remove(&self, id: u64) -> Option<SubscriptionRecord> {
        self.records.write().unwrap().remove(&id)
    }

    pub fn params_of(&self, id: u64) -> Option<SubscriptionParams> {
        self.records.read().unwrap().get(&id).map(|r| r.params.clone())
    }

    pub fn callback_of(&self, id: u64) -> Option<SubscriptionCallback> {
        self.records.read().unwrap().get(&id).map(|r| Arc::clone(&r.callback))
    }

    pub fn contains(&self, id: u64) -> bool {
        self.records.read().unwrap().contains_key(&id)
    }

    pub fn ids_owned_by_pid(&self, pid: u64) -> Vec<u64> {
        self.records
            .read()
            .unwrap()
            .iter()
            .filter(|(_, record)| record.owner_pid == Some(pid))
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::subscription_params::SiteSubscriptionParams;

    fn noop_callback() -> SubscriptionCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn ids_are_monotonic_and_never_zero() {
        let data = SubscriptionData::new();
        let a = data.insert(SubscriptionParams::Site(SiteSubscriptionParams), noop_callback(), None);
        let b = data.insert(SubscriptionParams::Site(SiteSubscriptionParams), noop_callback(), None);
        assert!(a > 0);
        assert!(b > a);
    }

    #[test]
    fn remove_drops_the_record() {
        let data = SubscriptionData::new();
        let id = data.insert(SubscriptionParams::Site(SiteSubscriptionParams), noop_callback(), None);
        assert!(data.contains(id));
        assert!(data.remove(id).is_some());
        assert!(!data.contains(id));
    }

    #[test]
    fn owned_by_pid_filters_correctly() {
        let data = SubscriptionData::new();
        let owned = data.insert(SubscriptionParams::Site(SiteSubscriptionParams), noop_callback(), Some(7));
        let _unowned = data.insert(SubscriptionParams::Site(SiteSubscriptionParams), noop_callback(), None);
        assert_eq!(data.ids_owned_by_pid(7), vec![owned]);
    }
}
