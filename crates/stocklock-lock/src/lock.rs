//! Backend-agnostic lock contract and scoped acquisition.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{error, warn};

use crate::token::LockToken;
use crate::{LockError, LockResult};

/// A cross-process, reentrant mutual-exclusion lock.
///
/// Ownership belongs to the calling execution context (tokio task, or thread
/// outside a task). `lock` and `unlock` must therefore be called from the same
/// context; use [`with_lock`] to get that for free.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Key of the protected resource's lock record.
    fn key(&self) -> &str;

    /// Wait until ownership is acquired, retrying with backoff on contention.
    ///
    /// Store failures are returned immediately, not retried.
    async fn lock(&self) -> LockResult<()>;

    /// Like [`lock`](Self::lock) but gives up after `timeout`. Returns
    /// `Ok(false)` without having acquired ownership when the time runs out.
    async fn try_lock(&self, timeout: Duration) -> LockResult<bool>;

    /// Release one level of ownership held by the calling context.
    ///
    /// Returns [`LockError::OwnershipLost`] without touching the store record
    /// when the context does not own it.
    async fn unlock(&self) -> LockResult<()>;

    /// Whether the calling context currently owns the lock record.
    async fn is_held_by_current_context(&self) -> LockResult<bool>;

    /// Hold count of the calling context as persisted in the store, 0 when it
    /// does not own the lock.
    async fn hold_count(&self) -> LockResult<u32>;

    /// Token the calling context holds the lock under, as known locally.
    fn held_token(&self) -> Option<LockToken>;

    /// Release one level held under `token` on a background task.
    ///
    /// For holders that can no longer call [`unlock`](Self::unlock) from their
    /// own context, such as a critical section whose future was dropped. Must
    /// not block; the outcome is only logged.
    fn release_detached(&self, token: LockToken);
}

/// Releases the hold from the background if the critical section is dropped
/// before it gets to release in place.
struct AbandonGuard<'a, L: DistributedLock + ?Sized> {
    lock: &'a L,
    token: Option<LockToken>,
}

impl<'a, L: DistributedLock + ?Sized> AbandonGuard<'a, L> {
    fn arm(lock: &'a L) -> Self {
        Self {
            lock,
            token: lock.held_token(),
        }
    }

    fn disarm(mut self) {
        self.token = None;
    }
}

impl<L: DistributedLock + ?Sized> Drop for AbandonGuard<'_, L> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            warn!(
                key = %self.lock.key(),
                owner = %token,
                "Critical section dropped while holding the lock; releasing in background"
            );
            self.lock.release_detached(token);
        }
    }
}

/// Run `section` while holding `lock`.
///
/// The lock is released on every exit path: success, an error returned by the
/// section, a panic (which is resumed after release), and the returned future
/// being dropped mid-section, in which case release runs on a background
/// task. Errors from the
/// section are returned unchanged. Losing ownership before release is logged
/// as a warning and does not turn a completed section into a failure; any
/// other release error is returned if the section itself succeeded.
pub async fn with_lock<L, F, Fut, T, E>(lock: &L, section: F) -> Result<T, E>
where
    L: DistributedLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    lock.lock().await?;
    run_then_release(lock, section).await
}

/// Like [`with_lock`] but fails with [`LockError::AcquireTimeout`] when the
/// lock cannot be acquired within `timeout`. The section does not run in that
/// case.
pub async fn with_lock_timeout<L, F, Fut, T, E>(
    lock: &L,
    timeout: Duration,
    section: F,
) -> Result<T, E>
where
    L: DistributedLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    if !lock.try_lock(timeout).await? {
        return Err(LockError::AcquireTimeout {
            key: lock.key().to_string(),
            timeout,
        }
        .into());
    }
    run_then_release(lock, section).await
}

async fn run_then_release<L, F, Fut, T, E>(lock: &L, section: F) -> Result<T, E>
where
    L: DistributedLock + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    // Stays armed until the in-place release has finished, so a drop during
    // `unlock` still releases.
    let guard = AbandonGuard::arm(lock);
    let outcome = AssertUnwindSafe(async { section().await })
        .catch_unwind()
        .await;
    let released = lock.unlock().await;
    guard.disarm();

    let result = match outcome {
        Ok(result) => result,
        Err(panic) => {
            if let Err(e) = released {
                error!(key = %lock.key(), "Release after panic in critical section failed: {}", e);
            }
            std::panic::resume_unwind(panic);
        }
    };

    match released {
        Ok(()) => result,
        Err(LockError::OwnershipLost { key }) => {
            warn!(
                key = %key,
                "Lock was lost before release; the critical section may have overlapped another holder"
            );
            result
        }
        Err(e) => match result {
            Ok(_) => Err(e.into()),
            Err(section_error) => {
                error!(key = %lock.key(), "Release after failed critical section failed: {}", e);
                Err(section_error)
            }
        },
    }
}
