//! Stocklock Store - the shared key-value store the lock and the counter live in
//!
//! This crate provides:
//! - The `SharedStore` contract: the handful of operations the lock protocol
//!   needs (conditional set with expiry, get, the compare-and-mutate scripts)
//! - `RedisStore`: Redis backend, every compound operation is one Lua script
//! - `MemoryStore`: in-process backend with the same atomicity, used by tests
//!   and single-node runs

mod error;
mod memory;
mod redis_store;
mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{LockRecord, ReleaseOutcome, SharedStore};
