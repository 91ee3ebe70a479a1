//! The single dispatch thread: pops events in enqueue order, routes each
//! to its processor, then runs the post-processing steps that cascade
//! deletions and PID completions into subscription cleanup.
//!
//! The "lock-free MPSC queue plus counting semaphore" this is modeled
//! after is realized as one `crossbeam_channel::unbounded` channel, the
//! same substitution [`crate::update_manager`] already makes for its own
//! immediate-queue wakeups.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::error;

use crate::events::event::{Event, EntityChangeAction, ProcessState, SiteAction};
use crate::events::processor::{lookup_keys_for_event, EventProcessors};
use crate::events::subscription_data::{RemovalReason, SubscriptionData, SubscriptionNotification};

enum DispatchMessage {
    Event(Event),
    Shutdown,
}

fn run(data: Arc<SubscriptionData>, processors: Arc<EventProcessors>, receiver: Receiver<DispatchMessage>) {
    loop {
        let message = match receiver.recv() {
            Ok(message) => message,
            Err(_) => break,
        };

        let event = match message {
            DispatchMessage::Shutdown => break,
            DispatchMessage::Event(event) => event,
        };

        let (entity_ids, site_ids, pid) = lookup_keys_for_event(&event);
        processors
            .for_event(&event)
            .process_event(&event, &data, &entity_ids, &site_ids, pid);

        match &event {
            Event::EntityChanged(changed) if changed.action == EntityChangeAction::Deleted => {
                for processor in processors.all() {
                    processor.entity_deleted(changed.id, &data);
                }
            }
            Event::Site(site_event) if site_event.action == SiteAction::Deleted => {
                for processor in processors.all() {
                    processor.site_deleted(site_event.site, &data);
                }
            }
            Event::ProcessExecution(proc_event) if proc_event.state == ProcessState::Completed => {
                for sub_id in data.ids_owned_by_pid(proc_event.pid) {
                    if let Some(callback) = data.callback_of(sub_id) {
                        callback(SubscriptionNotification::Removed(RemovalReason::ProcessCompleted(
                            proc_event.pid,
                        )));
                    }
                    data.remove(sub_id);
                    for processor in processors.all() {
                        processor.remove_subscription(sub_id);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Owns the dispatch thread and the channel producers publish through.
pub struct EventDispatcher {
    sender: Sender<DispatchMessage>,
    thread: Option<JoinHandle<()>>,
}

impl EventDispatcher {
    pub fn start(data: Arc<SubscriptionData>, processors: Arc<EventProcessors>) -> Self {
        let (sender, receiver) = unbounded();
        let thread = thread::spawn(move || run(data, processors, receiver));
        Self {
            sender,
            thread: Some(thread),
        }
    }

    pub fn publish(&self, event: Event) {
        if self.sender.send(DispatchMessage::Event(event)).is_err() {
            error!("event dispatch channel closed, dropping event");
        }
    }

    pub fn shutdown(mut self) {
        let _ = self.sender.send(DispatchMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
