//! Lock over a Redis-like store: conditional set with expiry to acquire,
//! owner-checked scripts to reenter and release.
//!
//! ## Acquire
//! 1. Generate a token for the calling context.
//! 2. Create `{token, count = 1}` with the ttl if the key is absent.
//! 3. Otherwise read the record; if its context matches the caller, increment
//!    the count with a script that compares the full stored token first.
//! 4. Otherwise back off and try again.
//!
//! ## Release
//! One script reads the record, compares the owner token, and decrements the
//! count or deletes the record. A non-owner never mutates it, so a caller
//! whose lease expired cannot delete the next holder's lock.
//!
//! Reentrant acquisition neither extends nor checks the original ttl.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stocklock_store::{ReleaseOutcome, SharedStore};
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use crate::config::LockConfig;
use crate::lock::DistributedLock;
use crate::token::{ClientId, ContextId, LockToken};
use crate::tracker::ReentrancyTracker;
use crate::watchdog::LeaseWatchdog;
use crate::{LockError, LockResult};

pub struct RedisLikeLock {
    store: Arc<dyn SharedStore>,
    config: LockConfig,
    client: ClientId,
    tracker: Arc<ReentrancyTracker>,
}

impl RedisLikeLock {
    /// Lock owned by a fresh client id. Two locks built this way never treat
    /// each other's contexts as the same owner, even on the same thread.
    pub fn new(store: Arc<dyn SharedStore>, config: LockConfig) -> Self {
        Self::with_client(store, config, ClientId::generate())
    }

    /// Lock sharing `client` with other locks of the same process, so a
    /// context holding the key through one of them can reenter through
    /// another.
    pub fn with_client(store: Arc<dyn SharedStore>, config: LockConfig, client: ClientId) -> Self {
        Self {
            store,
            config,
            client,
            tracker: Arc::new(ReentrancyTracker::new()),
        }
    }

    fn current_context(&self) -> ContextId {
        ContextId::current(&self.client)
    }

    /// One acquisition attempt. Returns whether the context now owns the lock.
    async fn attempt(&self, context: &ContextId) -> LockResult<bool> {
        let key = self.config.key.as_str();
        let token = LockToken::generate(context);
        let owner = token.to_string();

        if self
            .store
            .set_lock_if_absent(key, &owner, self.config.ttl)
            .await?
        {
            // `renewal` is a public field; a zero interval would panic the ticker.
            let watchdog = self
                .config
                .renewal
                .filter(|interval| !interval.is_zero())
                .map(|interval| {
                    LeaseWatchdog::new(
                        self.store.clone(),
                        key,
                        owner.clone(),
                        self.config.ttl,
                        interval,
                    )
                    .spawn()
                });
            self.tracker.acquired(token, watchdog);
            debug!(key = %key, owner = %owner, "Lock acquired");
            return Ok(true);
        }

        let Some(record) = self.store.get_lock(key).await? else {
            return Ok(false);
        };
        let Some(holder) = LockToken::parse(&record.owner_token) else {
            return Err(LockError::CorruptRecord(format!(
                "lock '{}' has unrecognized owner '{}'",
                key, record.owner_token
            )));
        };
        if !holder.is_owned_by(context) {
            trace!(key = %key, holder = %record.owner_token, "Lock held by another context");
            return Ok(false);
        }

        match self.store.increment_hold(key, &record.owner_token).await? {
            Some(hold_count) => {
                self.tracker.reentered(holder);
                debug!(key = %key, owner = %record.owner_token, hold_count, "Lock reentered");
                Ok(true)
            }
            // Released or expired between the read and the increment.
            None => Ok(false),
        }
    }
}

/// Apply a release outcome to the local bookkeeping.
fn settle_release(
    tracker: &ReentrancyTracker,
    key: &str,
    token: &LockToken,
    outcome: ReleaseOutcome,
) -> LockResult<()> {
    match outcome {
        ReleaseOutcome::Released => {
            tracker.forget(token);
            debug!(key = %key, owner = %token, "Lock released");
            Ok(())
        }
        ReleaseOutcome::StillHeld(remaining) => {
            debug!(key = %key, owner = %token, hold_count = remaining, "Lock hold released");
            Ok(())
        }
        ReleaseOutcome::NotOwner => {
            tracker.forget(token);
            warn!(key = %key, owner = %token, "Lock no longer owned at release; lease expired");
            Err(LockError::OwnershipLost {
                key: key.to_string(),
            })
        }
    }
}

#[async_trait]
impl DistributedLock for RedisLikeLock {
    fn key(&self) -> &str {
        &self.config.key
    }

    async fn lock(&self) -> LockResult<()> {
        let context = self.current_context();
        loop {
            if self.attempt(&context).await? {
                return Ok(());
            }
            tokio::time::sleep(self.config.backoff()).await;
        }
    }

    async fn try_lock(&self, timeout: Duration) -> LockResult<bool> {
        // A timeout past the end of the clock waits as long as `lock` does.
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.lock().await?;
            return Ok(true);
        };
        let context = self.current_context();

        // The deadline is only checked between attempts: abandoning an attempt
        // mid-flight could leave a record the caller never learns it owns.
        loop {
            if self.attempt(&context).await? {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(key = %self.config.key, ?timeout, "Lock acquisition timed out");
                return Ok(false);
            }
            tokio::time::sleep(self.config.backoff().min(deadline - now)).await;
        }
    }

    async fn unlock(&self) -> LockResult<()> {
        let key = self.config.key.as_str();
        let context = self.current_context();
        let Some(token) = self.tracker.token_for(&context) else {
            warn!(key = %key, context = %context, "Unlock called by a context that never acquired the lock");
            return Err(LockError::OwnershipLost {
                key: key.to_string(),
            });
        };

        let outcome = self.store.release_hold(key, &token.to_string()).await?;
        settle_release(&self.tracker, key, &token, outcome)
    }

    async fn is_held_by_current_context(&self) -> LockResult<bool> {
        Ok(self.hold_count().await? > 0)
    }

    async fn hold_count(&self) -> LockResult<u32> {
        let context = self.current_context();
        let record = self.store.get_lock(&self.config.key).await?;
        Ok(record
            .filter(|record| {
                LockToken::parse(&record.owner_token)
                    .is_some_and(|holder| holder.is_owned_by(&context))
            })
            .map(|record| record.hold_count)
            .unwrap_or(0))
    }

    fn held_token(&self) -> Option<LockToken> {
        self.tracker.token_for(&self.current_context())
    }

    fn release_detached(&self, token: LockToken) {
        let key = self.config.key.clone();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            // Without a runtime the watchdog is gone too; the ttl heals the record.
            self.tracker.forget(&token);
            warn!(key = %key, owner = %token, "No runtime to release an abandoned lock; left to expire");
            return;
        };

        let store = self.store.clone();
        let tracker = self.tracker.clone();
        runtime.spawn(async move {
            match store.release_hold(&key, &token.to_string()).await {
                Ok(outcome) => {
                    let _ = settle_release(&tracker, &key, &token, outcome);
                }
                Err(e) => {
                    // Stop renewing so the record can still expire.
                    tracker.forget(&token);
                    error!(key = %key, owner = %token, "Background release failed: {}", e);
                }
            }
        });
    }
}
