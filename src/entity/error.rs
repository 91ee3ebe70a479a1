//! Errors returned by fallible `Entity` operations: a flat, field-carrying
//! enum with one `#[error]` message per variant and no catch-all.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// A setter or reference-graph call was made with the wrong lock mode
    /// held (or no lock at all) for the operation attempted.
    #[error("entity access requires the write lock")]
    WrongLock,

    /// A `FieldTag` was used that is not defined for this entity's kind.
    #[error("field tag {field:?} is not valid for this entity kind")]
    OutOfRangeField { field: crate::field::FieldTag },

    /// A string field exceeded the configured size limit.
    #[error("value exceeds configured limit of {limit} characters")]
    SizeExceeded { limit: usize },

    /// `name` cannot be empty.
    #[error("entity name cannot be empty")]
    NameEmpty,
}

impl EntityError {
    /// A boolean view for call sites that want a `bool` return instead
    /// of propagating the error.
    pub fn is_ok<T>(result: &Result<T, EntityError>) -> bool {
        result.is_ok()
    }
}
