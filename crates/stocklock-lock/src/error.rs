//! Error types for distributed lock operations.

use std::time::Duration;

use stocklock_store::StoreError;
use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// The shared store cannot be reached. Not retried by the lock's own
    /// backoff, which only covers contention.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The factory cannot produce a lock for the requested backend
    #[error("unsupported lock backend: {0}")]
    UnsupportedBackend(String),

    /// `unlock()` was called by a context that does not own the record
    #[error("lock '{key}' is not owned by the calling context")]
    OwnershipLost { key: String },

    /// A bounded acquisition did not succeed in time
    #[error("timed out after {timeout:?} acquiring lock '{key}'")]
    AcquireTimeout { key: String, timeout: Duration },

    /// The lock key holds something that is not a lock record
    #[error("corrupt lock record: {0}")]
    CorruptRecord(String),
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => LockError::StoreUnavailable(message),
            malformed @ StoreError::Malformed { .. } => {
                LockError::CorruptRecord(malformed.to_string())
            }
        }
    }
}
