//! Event variants, subscription filters, per-type processors, and the
//! dispatch thread that ties them together.

pub mod bus;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod processor;
pub mod subscription_data;
pub mod subscription_params;

pub use bus::EventBus;
pub use error::{DispatchError, SubscriptionError};
pub use event::{
    ConnectionAction, ConnectionEvent, EmitEvent, Event, EntityChangeAction, EntityChangedEvent, MovementEvent,
    ProcessExecutionEvent, ProcessState, SiteAction, SiteEvent,
};
pub use subscription_data::{RemovalReason, SubscriptionCallback, SubscriptionNotification};
pub use subscription_params::{
    ConnectionSubscriptionParams, EmitSubscriptionParams, EntityChangedSubscriptionParams, MovementSubscriptionParams,
    ProcessExecutionSubscriptionParams, SiteSubscriptionParams, SubscriptionParams,
};
