//! Stocklock Lock - reentrant distributed lock over a shared store
//!
//! This crate provides:
//! - `DistributedLock`: the backend-agnostic lock contract
//! - `RedisLikeLock`: conditional-set-with-expiry acquisition and
//!   owner-checked scripted release
//! - `LockFactory`: builds locks for a `LockBackend`
//! - `with_lock` / `with_lock_timeout`: scoped acquisition that releases on
//!   every exit path
//! - Opt-in lease renewal for critical sections that may outlive the ttl

pub mod config;
pub mod error;
pub mod factory;
pub mod lock;
pub mod redis_like;
pub mod token;
pub mod tracker;
pub mod watchdog;

pub use config::LockConfig;
pub use error::{LockError, LockResult};
pub use factory::{LockBackend, LockFactory};
pub use lock::{DistributedLock, with_lock, with_lock_timeout};
pub use redis_like::RedisLikeLock;
pub use token::{ClientId, ContextId, LockToken};
