//! The operation contract every lock backend store must satisfy.

use std::time::Duration;

use async_trait::async_trait;

use crate::StoreResult;

/// A lock record as it currently exists in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Token of the acquisition that created the record
    pub owner_token: String,
    /// Number of nested acquisitions by the owner, always >= 1
    pub hold_count: u32,
    /// Time left before the store expires the record on its own
    pub expires_in: Option<Duration>,
}

/// Result of the compare-and-mutate release script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The record is absent or belongs to another token; nothing was changed
    NotOwner,
    /// One level released, the owner still holds the given count
    StillHeld(u32),
    /// The last level was released and the record deleted
    Released,
}

/// Shared key-value store used for both the lock record and the protected
/// counter.
///
/// Every method is a single round trip. The lock methods must execute without
/// interleaving from other clients (Lua scripts on Redis, a per-key entry
/// guard in memory); this is what makes the lock protocol safe without any
/// in-process synchronization.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Read a plain string value.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a plain string value, clearing any expiry.
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Unconditionally remove a key. Lock code never calls this on a key it
    /// does not provably own; it exists for tooling and tests.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Create `{owner, count = 1}` with the given expiry only if the key is
    /// absent. Returns whether the record was created.
    async fn set_lock_if_absent(&self, key: &str, owner: &str, ttl: Duration)
    -> StoreResult<bool>;

    /// Fetch the current lock record.
    async fn get_lock(&self, key: &str) -> StoreResult<Option<LockRecord>>;

    /// Increment the hold count if `owner` matches the stored owner token.
    /// Returns the new count, or `None` when the owner does not match. The
    /// expiry is left untouched.
    async fn increment_hold(&self, key: &str, owner: &str) -> StoreResult<Option<u32>>;

    /// Decrement the hold count if `owner` matches, deleting the record when
    /// the count reaches zero. The expiry is left untouched.
    async fn release_hold(&self, key: &str, owner: &str) -> StoreResult<ReleaseOutcome>;

    /// Reset the expiry to `ttl` if `owner` matches. Returns whether the lease
    /// was extended.
    async fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool>;
}
