//! In-memory store implementation (for testing and single-process runs).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::{LockRecord, ReleaseOutcome, SharedStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Lock { owner: String, count: u32 },
}

#[derive(Debug, Clone)]
struct Slot {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

/// In-memory `SharedStore`.
///
/// Each operation runs while holding the DashMap entry guard for its key, so
/// it is atomic with respect to every other operation on that key, the same
/// guarantee a Lua script gives on Redis. Expired keys are treated as absent
/// and evicted lazily on access.
#[derive(Debug, Default)]
pub struct MemoryStore {
    slots: DashMap<String, Slot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn remove_expired(&self, key: &str, now: Instant) {
        self.slots.remove_if(key, |_, slot| slot.is_expired(now));
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let value = match self.slots.get(key) {
            Some(slot) if !slot.is_expired(now) => match &slot.value {
                StoredValue::Text(text) => Some(text.clone()),
                StoredValue::Lock { .. } => {
                    return Err(StoreError::malformed(key, "holds a lock record, not a string"));
                }
            },
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.remove_expired(key, now);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.slots.insert(
            key.to_string(),
            Slot {
                value: StoredValue::Text(value.to_string()),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .slots
            .remove(key)
            .is_some_and(|(_, slot)| !slot.is_expired(now)))
    }

    async fn set_lock_if_absent(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        let slot = Slot {
            value: StoredValue::Lock {
                owner: owner.to_string(),
                count: 1,
            },
            expires_at: Some(now + ttl),
        };

        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(slot);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn get_lock(&self, key: &str) -> StoreResult<Option<LockRecord>> {
        let now = Instant::now();
        let record = match self.slots.get(key) {
            Some(slot) if !slot.is_expired(now) => match &slot.value {
                StoredValue::Lock { owner, count } => Some(LockRecord {
                    owner_token: owner.clone(),
                    hold_count: *count,
                    expires_in: slot.expires_at.map(|deadline| deadline - now),
                }),
                StoredValue::Text(_) => {
                    return Err(StoreError::malformed(key, "holds a string, not a lock record"));
                }
            },
            Some(_) => None,
            None => return Ok(None),
        };

        if record.is_none() {
            self.remove_expired(key, now);
        }
        Ok(record)
    }

    async fn increment_hold(&self, key: &str, owner: &str) -> StoreResult<Option<u32>> {
        let now = Instant::now();
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(None);
        };
        if slot.is_expired(now) {
            return Ok(None);
        }

        match &mut slot.value {
            StoredValue::Lock {
                owner: current,
                count,
            } if current.as_str() == owner => {
                *count += 1;
                Ok(Some(*count))
            }
            StoredValue::Lock { .. } => Ok(None),
            StoredValue::Text(_) => Err(StoreError::malformed(
                key,
                "holds a string, not a lock record",
            )),
        }
    }

    async fn release_hold(&self, key: &str, owner: &str) -> StoreResult<ReleaseOutcome> {
        let now = Instant::now();
        let Entry::Occupied(mut occupied) = self.slots.entry(key.to_string()) else {
            return Ok(ReleaseOutcome::NotOwner);
        };
        if occupied.get().is_expired(now) {
            occupied.remove();
            return Ok(ReleaseOutcome::NotOwner);
        }

        let remaining = match &mut occupied.get_mut().value {
            StoredValue::Lock {
                owner: current,
                count,
            } if current.as_str() == owner => {
                *count -= 1;
                *count
            }
            StoredValue::Lock { .. } => return Ok(ReleaseOutcome::NotOwner),
            StoredValue::Text(_) => {
                return Err(StoreError::malformed(key, "holds a string, not a lock record"));
            }
        };

        if remaining > 0 {
            Ok(ReleaseOutcome::StillHeld(remaining))
        } else {
            occupied.remove();
            Ok(ReleaseOutcome::Released)
        }
    }

    async fn renew_lease(&self, key: &str, owner: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let Some(mut slot) = self.slots.get_mut(key) else {
            return Ok(false);
        };
        if slot.is_expired(now) {
            return Ok(false);
        }

        let owned = match &slot.value {
            StoredValue::Lock { owner: current, .. } => current.as_str() == owner,
            StoredValue::Text(_) => {
                return Err(StoreError::malformed(key, "holds a string, not a lock record"));
            }
        };
        if owned {
            slot.expires_at = Some(now + ttl);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_set_lock_if_absent_only_once() {
        let store = MemoryStore::new();

        assert!(store.set_lock_if_absent("lock", "owner-a", TTL).await.unwrap());
        assert!(!store.set_lock_if_absent("lock", "owner-b", TTL).await.unwrap());

        let record = store.get_lock("lock").await.unwrap().unwrap();
        assert_eq!(record.owner_token, "owner-a");
        assert_eq!(record.hold_count, 1);
        assert!(record.expires_in.unwrap() <= TTL);
    }

    #[tokio::test]
    async fn test_expired_lock_is_absent() {
        let store = MemoryStore::new();
        store
            .set_lock_if_absent("lock", "owner-a", Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(store.get_lock("lock").await.unwrap().is_none());
        assert!(store.set_lock_if_absent("lock", "owner-b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_increment_requires_matching_owner() {
        let store = MemoryStore::new();
        store.set_lock_if_absent("lock", "owner-a", TTL).await.unwrap();

        assert_eq!(store.increment_hold("lock", "owner-b").await.unwrap(), None);
        assert_eq!(store.increment_hold("lock", "owner-a").await.unwrap(), Some(2));
        assert_eq!(store.increment_hold("missing", "owner-a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_release_decrements_then_deletes() {
        let store = MemoryStore::new();
        store.set_lock_if_absent("lock", "owner-a", TTL).await.unwrap();
        store.increment_hold("lock", "owner-a").await.unwrap();

        assert_eq!(
            store.release_hold("lock", "owner-b").await.unwrap(),
            ReleaseOutcome::NotOwner
        );
        assert_eq!(
            store.release_hold("lock", "owner-a").await.unwrap(),
            ReleaseOutcome::StillHeld(1)
        );
        assert_eq!(
            store.release_hold("lock", "owner-a").await.unwrap(),
            ReleaseOutcome::Released
        );
        assert!(store.get_lock("lock").await.unwrap().is_none());
        assert_eq!(
            store.release_hold("lock", "owner-a").await.unwrap(),
            ReleaseOutcome::NotOwner
        );
    }

    #[tokio::test]
    async fn test_renew_extends_only_for_owner() {
        let store = MemoryStore::new();
        store
            .set_lock_if_absent("lock", "owner-a", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(!store.renew_lease("lock", "owner-b", TTL).await.unwrap());
        assert!(store.renew_lease("lock", "owner-a", TTL).await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(store.get_lock("lock").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_malformed() {
        let store = MemoryStore::new();
        store.set("inventory", "5").await.unwrap();
        store.set_lock_if_absent("lock", "owner-a", TTL).await.unwrap();

        assert!(matches!(
            store.get_lock("inventory").await,
            Err(StoreError::Malformed { .. })
        ));
        assert!(matches!(
            store.get("lock").await,
            Err(StoreError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_plain_values() {
        let store = MemoryStore::new();
        assert_eq!(store.get("inventory").await.unwrap(), None);

        store.set("inventory", "3").await.unwrap();
        assert_eq!(store.get("inventory").await.unwrap().as_deref(), Some("3"));

        assert!(store.delete("inventory").await.unwrap());
        assert!(!store.delete("inventory").await.unwrap());
    }
}
