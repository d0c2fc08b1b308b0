//! Redis-backed store implementation.
//!
//! The lock record is a hash with `owner` and `count` fields; its expiry is
//! the key's native PEXPIRE deadline. Every operation that reads and then
//! mutates the record is a Lua script, so it executes on the server without
//! interleaving from other clients. Client code never issues a separate
//! get-then-delete pair.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::debug;

use crate::{LockRecord, ReleaseOutcome, SharedStore, StoreError, StoreResult};

/// KEYS[1] = lock key, ARGV[1] = owner token, ARGV[2] = ttl in millis
const ACQUIRE_SCRIPT: &str = r#"
if redis.call('exists', KEYS[1]) == 0 then
    redis.call('hset', KEYS[1], 'owner', ARGV[1], 'count', 1)
    redis.call('pexpire', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// KEYS[1] = lock key. Returns nil when absent, else {owner, count, pttl}.
const INSPECT_SCRIPT: &str = r#"
if redis.call('exists', KEYS[1]) == 0 then
    return nil
end
local owner = redis.call('hget', KEYS[1], 'owner')
local count = redis.call('hget', KEYS[1], 'count')
return {owner, count, redis.call('pttl', KEYS[1])}
"#;

/// KEYS[1] = lock key, ARGV[1] = owner token. Returns the new count, 0 if not owner.
const REENTER_SCRIPT: &str = r#"
if redis.call('hget', KEYS[1], 'owner') == ARGV[1] then
    return redis.call('hincrby', KEYS[1], 'count', 1)
end
return 0
"#;

/// KEYS[1] = lock key, ARGV[1] = owner token.
/// Returns -1 if not owner, 0 when the record was deleted, else the remaining count.
const RELEASE_SCRIPT: &str = r#"
if redis.call('hget', KEYS[1], 'owner') ~= ARGV[1] then
    return -1
end
local count = redis.call('hincrby', KEYS[1], 'count', -1)
if count > 0 then
    return count
end
redis.call('del', KEYS[1])
return 0
"#;

/// KEYS[1] = lock key, ARGV[1] = owner token, ARGV[2] = ttl in millis
const RENEW_SCRIPT: &str = r#"
if redis.call('hget', KEYS[1], 'owner') == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
end
return 0
"#;

/// Redis implementation of `SharedStore`.
///
/// ## Architecture
/// - `ConnectionManager` for a shared, automatically reconnecting connection
/// - Scripts are sent with EVALSHA and loaded on first NOSCRIPT
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    acquire: Script,
    inspect: Script,
    reenter: Script,
    release: Script,
    renew: Script,
}

impl RedisStore {
    /// Connect to Redis.
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1/`
    /// - `rediss://host:6379/`
    pub async fn new(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)
            .map_err(|e| StoreError::Unavailable(format!("failed to create redis client: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect redis: {e}")))?;

        debug!(url = %url, "Connected to redis");

        Ok(Self {
            manager,
            acquire: Script::new(ACQUIRE_SCRIPT),
            inspect: Script::new(INSPECT_SCRIPT),
            reenter: Script::new(REENTER_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
            renew: Script::new(RENEW_SCRIPT),
        })
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

/// Attach the key to errors raised for it.
fn keyed(key: &str) -> impl FnOnce(redis::RedisError) -> StoreError + '_ {
    move |err| match StoreError::from(err) {
        StoreError::Malformed { reason, .. } => StoreError::malformed(key, reason),
        other => other,
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(key).await.map_err(keyed(key))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        conn.set::<_, _, ()>(key, value).await.map_err(keyed(key))
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.del(key).await.map_err(keyed(key))?;
        Ok(removed > 0)
    }

    async fn set_lock_if_absent(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let created: i64 = self
            .acquire
            .key(key)
            .arg(owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(keyed(key))?;
        Ok(created == 1)
    }

    async fn get_lock(&self, key: &str) -> StoreResult<Option<LockRecord>> {
        let mut conn = self.manager.clone();
        let raw: Option<(Option<String>, Option<u32>, i64)> = self
            .inspect
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(keyed(key))?;

        let Some((owner, count, pttl)) = raw else {
            return Ok(None);
        };
        let (Some(owner_token), Some(hold_count)) = (owner, count) else {
            return Err(StoreError::malformed(key, "lock hash is missing owner or count"));
        };

        Ok(Some(LockRecord {
            owner_token,
            hold_count,
            expires_in: u64::try_from(pttl).ok().map(Duration::from_millis),
        }))
    }

    async fn increment_hold(&self, key: &str, owner: &str) -> StoreResult<Option<u32>> {
        let mut conn = self.manager.clone();
        let count: i64 = self
            .reenter
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(keyed(key))?;
        Ok(u32::try_from(count).ok().filter(|count| *count > 0))
    }

    async fn release_hold(&self, key: &str, owner: &str) -> StoreResult<ReleaseOutcome> {
        let mut conn = self.manager.clone();
        let remaining: i64 = self
            .release
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(keyed(key))?;

        Ok(match remaining {
            0 => ReleaseOutcome::Released,
            n if n > 0 => ReleaseOutcome::StillHeld(n as u32),
            _ => ReleaseOutcome::NotOwner,
        })
    }

    async fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let renewed: i64 = self
            .renew
            .key(key)
            .arg(owner)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(keyed(key))?;
        Ok(renewed == 1)
    }
}
