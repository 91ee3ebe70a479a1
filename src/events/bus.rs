//! The public façade over subscription management and event publishing.
//! Callers never touch a processor or the dispatch channel directly,
//! only this type.

use std::sync::{Arc, Mutex};

use crate::events::dispatcher::EventDispatcher;
use crate::events::error::SubscriptionError;
use crate::events::event::Event;
use crate::events::processor::{index_keys_for_params, EventProcessors};
use crate::events::subscription_data::{SubscriptionCallback, SubscriptionData};
use crate::events::subscription_params::SubscriptionParams;

pub struct EventBus {
    data: Arc<SubscriptionData>,
    processors: Arc<EventProcessors>,
    dispatcher: Mutex<Option<EventDispatcher>>,
}

impl EventBus {
    pub fn new() -> Self {
        let data = Arc::new(SubscriptionData::new());
        let processors = Arc::new(EventProcessors::new());
        let dispatcher = EventDispatcher::start(Arc::clone(&data), Arc::clone(&processors));
        Self {
            data,
            processors,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Validates `params`, records the subscription, and indexes it.
    /// A rejected subscription has no id to return; callers that want
    /// a sentinel rather than an error can map `Err(_)` to `0`.
    pub fn subscribe(
        &self,
        params: SubscriptionParams,
        callback: SubscriptionCallback,
        owner_pid: Option<u64>,
    ) -> Result<u64, SubscriptionError> {
        if !params.validate() {
            return Err(SubscriptionError::ValidateFailed);
        }

        let processor = self.processors.for_params(&params);
        let (entity_ids, site_ids, pid) = index_keys_for_params(&params);
        let id = self.data.insert(params, callback, owner_pid);
        processor.add_subscription(id, &entity_ids, &site_ids, pid);
        Ok(id)
    }

    pub fn unsubscribe(&self, id: u64) -> Result<(), SubscriptionError> {
        let Some(params) = self.data.params_of(id) else {
            return Err(SubscriptionError::NotFound);
        };
        self.processors.for_params(&params).remove_subscription(id);
        self.data.remove(id);
        Ok(())
    }

    pub fn publish(&self, event: Event) {
        if let Some(dispatcher) = self.dispatcher.lock().unwrap().as_ref() {
            dispatcher.publish(event);
        }
    }

    /// Idempotent: a second call is a no-op.
    pub fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.lock().unwrap().take() {
            dispatcher.shutdown();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::{ConnectionAction, ConnectionEvent};
    use crate::events::subscription_params::ConnectionSubscriptionParams;
    use crate::identifier::Id;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn subscribe_rejects_invalid_params() {
        let bus = EventBus::new();
        let params = SubscriptionParams::Connection(ConnectionSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 1)])),
            site_ids: Some(HashSet::from([1])),
            ..Default::default()
        });
        assert_eq!(bus.subscribe(params, Arc::new(|_| {}), None), Err(SubscriptionError::ValidateFailed));
    }

    #[test]
    fn publish_invokes_matching_subscriber() {
        let bus = EventBus::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);

        let params = SubscriptionParams::Connection(ConnectionSubscriptionParams {
            entity_ids: Some(HashSet::from([Id::new(0, 1)])),
            ..Default::default()
        });
        bus.subscribe(
            params,
            Arc::new(move |notification| received2.lock().unwrap().push(format!("{notification:?}"))),
            None,
        )
        .unwrap();

        bus.publish(Event::Connection(ConnectionEvent {
            action: ConnectionAction::Connect,
            entity: Id::new(0, 1),
            source: "1.2.3.4".into(),
        }));

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(received.lock().unwrap().len(), 1);
        bus.shutdown();
    }

    #[test]
    fn unsubscribe_unknown_id_is_not_found() {
        let bus = EventBus::new();
        assert_eq!(bus.unsubscribe(999), Err(SubscriptionError::NotFound));
    }
}
