use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("entity is still in live custody")]
    EntityInUse,
    #[error("entity not found")]
    NotFound,
    #[error("entity already exists")]
    AlreadyExists,
}
