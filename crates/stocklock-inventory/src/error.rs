use stocklock_lock::LockError;
use stocklock_store::StoreError;
use thiserror::Error;

pub type InventoryResult<T> = Result<T, InventoryError>;

#[derive(Error, Debug)]
pub enum InventoryError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The counter holds something other than a non-negative integer
    #[error("inventory counter '{key}' is malformed: '{value}'")]
    MalformedCounter { key: String, value: String },
}

impl InventoryError {
    /// Whether the failure is the shared store being unreachable, as opposed to
    /// bad data.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            InventoryError::Lock(LockError::StoreUnavailable(_))
                | InventoryError::Store(StoreError::Unavailable(_))
        )
    }
}
