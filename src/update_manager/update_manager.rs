//! The background committer: immediate id-reference processing plus a
//! timed commit/delete/site-delete tick. The "one counting semaphore" is
//! realized as a `crossbeam_channel::unbounded` channel whose
//! `recv_timeout` blocks exactly like a timed semaphore wait — the same
//! substitution [`crate::events::dispatcher`] makes for its own queue.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, warn};

use crate::cache::EntityCache;
use crate::entity::journal::{IdFieldDelta, SetDelta};
use crate::entity::{Entity, EntityListener, Journal};
use crate::field::FieldTag;
use crate::identifier::{Id, SiteId};
use crate::update_manager::references::remove_all_references;

enum ManagerMessage {
    Wake,
    Shutdown,
}

#[derive(Default)]
struct Queues {
    immediate: Vec<(Id, Journal)>,
    pending_updates: HashMap<Id, Journal>,
    pending_deletes: HashSet<Id>,
    pending_site_deletes: Vec<SiteId>,
}

impl Queues {
    fn is_empty(&self) -> bool {
        self.immediate.is_empty()
            && self.pending_updates.is_empty()
            && self.pending_deletes.is_empty()
            && self.pending_site_deletes.is_empty()
    }
}

pub struct UpdateManager {
    cache: Arc<EntityCache>,
    commit_interval: Duration,
    queues: std::sync::Mutex<Queues>,
    sender: Sender<ManagerMessage>,
    shutdown_flag: AtomicBool,
}

impl UpdateManager {
    fn enqueue_delete(&self, id: Id) {
        self.queues.lock().unwrap().pending_deletes.insert(id);
    }

    fn drain_immediate(&self) {
        let entries = std::mem::take(&mut self.queues.lock().unwrap().immediate);
        if entries.is_empty() {
            return;
        }
        let mut merged: HashMap<Id, Journal> = HashMap::new();
        for (entity_id, mut journal) in entries {
            let id_deltas = journal.take_id_deltas();
            for (field, delta) in id_deltas {
                for added in delta.added {
                    if let Some(target) = self.cache.get_including_deleted(added) {
                        target.entity().add_entity_reference(entity_id, field);
                    }
                }
                for removed in delta.removed {
                    if let Some(target) = self.cache.get_including_deleted(removed) {
                        target.entity().remove_entity_reference(entity_id, field);
                    }
                }
            }
            merged.entry(entity_id).or_default().merge(&journal);
        }

        let mut queues = self.queues.lock().unwrap();
        for (id, journal) in merged {
            queues.pending_updates.entry(id).or_default().merge(&journal);
        }
    }

    fn commit_tick(&self) {
        let (updates, deletes, site_deletes) = {
            let mut queues = self.queues.lock().unwrap();
            (
                std::mem::take(&mut queues.pending_updates),
                std::mem::take(&mut queues.pending_deletes),
                std::mem::take(&mut queues.pending_site_deletes),
            )
        };

        for id in updates.keys() {
            if let Some(handle) = self.cache.get_including_deleted(*id) {
                if let Err(e) = self.cache.internal_commit_entity(&handle) {
                    error!("commit failed for {id}: {e}");
                }
            }
        }

        for id in deletes {
            let Some(handle) = self.cache.get_including_deleted(id) else {
                continue;
            };
            remove_all_references(handle.entity(), &self.cache);
            handle.entity().clear_dirty();
            drop(handle);
            match self.cache.internal_delete_entity(id) {
                Ok(()) => {
                    debug!("purged {id}");
                    self.cache.listeners().notify_deleted(&HashSet::from([id]));
                }
                Err(_) => {
                    warn!("purge of {id} deferred: still in use");
                    self.enqueue_delete(id);
                }
            }
        }

        for site in site_deletes {
            let remaining = self.cache.store().list_site(site);
            if remaining.is_empty() {
                if let Err(e) = self.cache.store().delete_site(site) {
                    error!("site delete failed for site {site}: {e}");
                }
            } else {
                for id in remaining {
                    self.enqueue_delete(id);
                }
                self.queues.lock().unwrap().pending_site_deletes.push(site);
            }
        }
    }

    fn run(self: Arc<Self>, receiver: Receiver<ManagerMessage>) {
        let mut last_commit = Instant::now();
        loop {
            let message = receiver.recv_timeout(self.commit_interval);
            let shutting_down =
                matches!(message, Ok(ManagerMessage::Shutdown)) || self.shutdown_flag.load(Ordering::SeqCst);

            if matches!(message, Err(RecvTimeoutError::Disconnected)) && !shutting_down {
                warn!("update manager channel disconnected unexpectedly");
                break;
            }

            self.drain_immediate();

            if shutting_down || last_commit.elapsed() >= self.commit_interval {
                self.commit_tick();
                last_commit = Instant::now();
            }

            if shutting_down && self.queues.lock().unwrap().is_empty() {
                break;
            }
        }
    }
}

impl EntityListener for UpdateManager {
    fn entity_changed(
        &self,
        entity: &Entity,
        changed_fields: &HashSet<FieldTag>,
        flag_delta: &SetDelta<String>,
        id_deltas: &HashMap<FieldTag, IdFieldDelta>,
    ) {
        if changed_fields.contains(&FieldTag::DeletedFlag) && entity.is_deleted() {
            self.enqueue_delete(entity.id());
            let _ = self.sender.send(ManagerMessage::Wake);
            return;
        }

        let journal = Journal::from_parts(changed_fields.clone(), flag_delta.clone(), id_deltas.clone());
        let mut queues = self.queues.lock().unwrap();
        if id_deltas.values().any(|d| !d.is_empty()) {
            queues.immediate.push((entity.id(), journal));
        } else {
            queues.pending_updates.entry(entity.id()).or_default().merge(&journal);
        }
        drop(queues);
        let _ = self.sender.send(ManagerMessage::Wake);
    }

    fn entities_deleted(&self, ids: &HashSet<Id>) {
        let mut queues = self.queues.lock().unwrap();
        queues.pending_deletes.extend(ids.iter().copied());
    }

    fn site_deleted(&self, site: SiteId) {
        self.queues.lock().unwrap().pending_site_deletes.push(site);
        let _ = self.sender.send(ManagerMessage::Wake);
    }
}

/// Owns the spawned committer thread; dropping without calling
/// [`UpdateManagerHandle::shutdown`] leaves the thread running. Shutdown
/// is explicit rather than `Drop`-triggered.
pub struct UpdateManagerHandle {
    manager: Arc<UpdateManager>,
    sender: Sender<ManagerMessage>,
    thread: Option<JoinHandle<()>>,
}

impl UpdateManagerHandle {
    pub fn start(cache: Arc<EntityCache>, commit_interval: Duration) -> Self {
        let (sender, receiver) = unbounded();
        let manager = Arc::new(UpdateManager {
            cache: Arc::clone(&cache),
            commit_interval,
            queues: std::sync::Mutex::new(Queues::default()),
            sender: sender.clone(),
            shutdown_flag: AtomicBool::new(false),
        });

        cache.add_entity_listener(Arc::clone(&manager) as Arc<dyn EntityListener>);

        let worker = Arc::clone(&manager);
        let thread = thread::spawn(move || worker.run(receiver));

        Self {
            manager,
            sender,
            thread: Some(thread),
        }
    }

    /// Signals a large backwards wall-clock jump, forcing an earlier tick
    /// than the configured commit interval would otherwise allow.
    pub fn notify_time_jump(&self) {
        let _ = self.sender.send(ManagerMessage::Wake);
    }

    pub fn shutdown(mut self) {
        self.manager.shutdown_flag.store(true, Ordering::SeqCst);
        let _ = self.sender.send(ManagerMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::entity::kind::EntityKind;
    use crate::entity::ListenerRegistry;
    use crate::store::{BackingStore, MemoryStore};

    fn test_cache() -> Arc<EntityCache> {
        let listeners = Arc::new(ListenerRegistry::new());
        let store: Arc<dyn BackingStore> = Arc::new(MemoryStore::new(
            Arc::new(StoreConfig::default()),
            Arc::clone(&listeners),
        ));
        Arc::new(EntityCache::new(store, listeners))
    }

    #[test]
    fn immediate_drain_installs_back_reference() {
        let cache = test_cache();
        let handle = UpdateManagerHandle::start(Arc::clone(&cache), Duration::from_millis(20));

        let a = cache
            .store()
            .new_entity(EntityKind::Player, 1, Id::default(), "A".into())
            .unwrap();
        let b = cache
            .store()
            .new_entity(EntityKind::Room, 1, Id::default(), "B".into())
            .unwrap();

        a.set_player_home(b.id()).unwrap();

        // Give the committer thread a chance to drain the immediate queue.
        thread::sleep(Duration::from_millis(100));

        assert!(b.refs_from_id(a.id()).contains(&FieldTag::PlayerHome));

        handle.shutdown();
    }

    #[test]
    fn shutdown_joins_cleanly_with_empty_queues() {
        let cache = test_cache();
        let handle = UpdateManagerHandle::start(cache, Duration::from_millis(20));
        handle.shutdown();
    }
}
