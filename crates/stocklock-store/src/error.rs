//! Error types for shared store operations.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the shared store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or the command failed in transit
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A key holds a value of the wrong shape (e.g. a counter where a lock
    /// record was expected)
    #[error("malformed value at '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

impl StoreError {
    pub fn malformed(key: &str, reason: impl Into<String>) -> Self {
        StoreError::Malformed {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.kind() == redis::ErrorKind::TypeError || err.code() == Some("WRONGTYPE") {
            StoreError::Malformed {
                key: String::new(),
                reason: err.to_string(),
            }
        } else {
            StoreError::Unavailable(format!("Redis error: {}", err))
        }
    }
}
