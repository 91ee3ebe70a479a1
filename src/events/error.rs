//! Error types for subscription management and dispatch.
//!
//! Mirrors the shape of [`crate::entity::error::EntityError`] and
//! [`crate::store::error::StoreError`]: small `thiserror` enums, no
//! blanket catch-all variant.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("subscription params failed validation")]
    ValidateFailed,
    #[error("subscription not found")]
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("event does not match the processor's event type")]
    TypeMismatch,
}
