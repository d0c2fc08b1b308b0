//! Backend selection for distributed locks.

use std::sync::Arc;

use stocklock_store::SharedStore;

use crate::config::LockConfig;
use crate::lock::DistributedLock;
use crate::redis_like::RedisLikeLock;
use crate::token::ClientId;
use crate::{LockError, LockResult};

/// Lock backends a factory can be asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockBackend {
    /// Conditional set with expiry plus server-side scripts
    RedisLikeStore,
    /// Ephemeral sequential nodes in a coordination service (not implemented)
    CoordinationService,
    /// Row locks in a relational database (not implemented)
    RelationalStore,
}

impl LockBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockBackend::RedisLikeStore => "redis-like-store",
            LockBackend::CoordinationService => "coordination-service",
            LockBackend::RelationalStore => "relational-store",
        }
    }
}

impl std::fmt::Display for LockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LockBackend {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis-like-store" | "redis" => Ok(LockBackend::RedisLikeStore),
            "coordination-service" | "zookeeper" => Ok(LockBackend::CoordinationService),
            "relational-store" | "mysql" => Ok(LockBackend::RelationalStore),
            _ => Err(LockError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Builds locks bound to one shared store.
///
/// All locks from one factory share a client id, so a context that holds a
/// key through one of them is recognised as the owner by the others.
pub struct LockFactory {
    store: Arc<dyn SharedStore>,
    config: LockConfig,
    client: ClientId,
}

impl LockFactory {
    pub fn new(store: Arc<dyn SharedStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            client: ClientId::generate(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client
    }

    pub fn get_lock(&self, backend: LockBackend) -> LockResult<Arc<dyn DistributedLock>> {
        match backend {
            LockBackend::RedisLikeStore => Ok(Arc::new(RedisLikeLock::with_client(
                self.store.clone(),
                self.config.clone(),
                self.client.clone(),
            ))),
            LockBackend::CoordinationService | LockBackend::RelationalStore => {
                Err(LockError::UnsupportedBackend(backend.to_string()))
            }
        }
    }

    /// Parse a backend tag such as `redis` and build the lock.
    pub fn get_lock_by_tag(&self, tag: &str) -> LockResult<Arc<dyn DistributedLock>> {
        self.get_lock(tag.parse()?)
    }
}
