//! Integration tests for the distributed lock
//!
//! Exercises mutual exclusion, reentrancy, expiry and scoped release against
//! the in-process store. Contexts in different "processes" are modelled by
//! locks from different factories sharing one store.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use stocklock_lock::{
    DistributedLock, LockBackend, LockConfig, LockError, LockFactory, with_lock, with_lock_timeout,
};
use stocklock_store::{
    LockRecord, MemoryStore, ReleaseOutcome, SharedStore, StoreError, StoreResult,
};

const KEY: &str = "it-lock";

fn lock_on(store: &Arc<MemoryStore>, config: LockConfig) -> Arc<dyn DistributedLock> {
    LockFactory::new(store.clone(), config)
        .get_lock(LockBackend::RedisLikeStore)
        .unwrap()
}

fn fast_config() -> LockConfig {
    LockConfig::new(KEY).with_retry_delay(Duration::from_millis(2))
}

// ============================================================================
// Mutual exclusion
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_two_contexts_inside_critical_section() {
    const CLIENTS: usize = 4;
    const TASKS_PER_CLIENT: usize = 3;
    const ROUNDS: usize = 5;

    let store = Arc::new(MemoryStore::new());
    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..CLIENTS {
        let factory = Arc::new(LockFactory::new(
            store.clone(),
            fast_config().with_retry_jitter(Duration::from_millis(3)),
        ));
        for _ in 0..TASKS_PER_CLIENT {
            let lock = factory.get_lock(LockBackend::RedisLikeStore).unwrap();
            let active = active.clone();
            let max_active = max_active.clone();
            let completed = completed.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    with_lock(lock.as_ref(), || async {
                        let inside = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(inside, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, LockError>(())
                    })
                    .await
                    .unwrap();
                }
            }));
        }
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    assert_eq!(
        completed.load(Ordering::SeqCst),
        CLIENTS * TASKS_PER_CLIENT * ROUNDS
    );
    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tasks_of_one_client_are_different_owners() {
    let store = Arc::new(MemoryStore::new());
    let factory = Arc::new(LockFactory::new(store.clone(), fast_config()));
    let lock = factory.get_lock(LockBackend::RedisLikeStore).unwrap();

    lock.lock().await.unwrap();

    let other = factory.get_lock(LockBackend::RedisLikeStore).unwrap();
    let contender = tokio::spawn(async move {
        let acquired = other.try_lock(Duration::from_millis(50)).await.unwrap();
        let unlock = other.unlock().await;
        (acquired, unlock)
    });
    let (acquired, unlock) = contender.await.unwrap();

    assert!(!acquired);
    assert!(matches!(unlock, Err(LockError::OwnershipLost { .. })));
    assert_eq!(lock.hold_count().await.unwrap(), 1);
    lock.unlock().await.unwrap();
}

// ============================================================================
// Reentrancy
// ============================================================================

#[tokio::test]
async fn test_nested_acquisition_releases_at_outermost_level() {
    let store = Arc::new(MemoryStore::new());
    let lock = lock_on(&store, fast_config());

    let depth = with_lock(lock.as_ref(), || async {
        with_lock(lock.as_ref(), || async {
            assert_eq!(lock.hold_count().await?, 2);
            Ok::<_, LockError>(())
        })
        .await?;
        assert!(lock.is_held_by_current_context().await?);
        lock.hold_count().await
    })
    .await
    .unwrap();

    assert_eq!(depth, 1);
    assert!(!lock.is_held_by_current_context().await.unwrap());
    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

// ============================================================================
// Lease expiry
// ============================================================================

#[tokio::test]
async fn test_crashed_holder_heals_after_ttl() {
    let store = Arc::new(MemoryStore::new());
    let config = fast_config().with_ttl(Duration::from_millis(100));

    // Acquired and never released, as if the process died.
    let crashed = lock_on(&store, config.clone());
    crashed.lock().await.unwrap();

    let survivor = lock_on(&store, config);
    assert!(!survivor.try_lock(Duration::from_millis(20)).await.unwrap());
    assert!(survivor.try_lock(Duration::from_millis(500)).await.unwrap());
    survivor.unlock().await.unwrap();
}

#[tokio::test]
async fn test_section_outliving_ttl_overlaps_without_renewal() {
    let store = Arc::new(MemoryStore::new());
    let config = fast_config().with_ttl(Duration::from_millis(50));
    let slow = lock_on(&store, config.clone());
    let next = lock_on(&store, config);

    slow.lock().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(next.try_lock(Duration::ZERO).await.unwrap());

    // The slow holder's late release must not delete the new owner's record.
    assert!(matches!(
        slow.unlock().await,
        Err(LockError::OwnershipLost { .. })
    ));
    assert!(next.is_held_by_current_context().await.unwrap());
    assert_eq!(store.get_lock(KEY).await.unwrap().unwrap().hold_count, 1);

    next.unlock().await.unwrap();
}

#[tokio::test]
async fn test_renewal_keeps_slow_section_exclusive() {
    let store = Arc::new(MemoryStore::new());
    let config = fast_config()
        .with_ttl(Duration::from_millis(60))
        .with_renewal(Duration::from_millis(15));
    let slow = lock_on(&store, config.clone());
    let next = lock_on(&store, config);

    slow.lock().await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!next.try_lock(Duration::from_millis(20)).await.unwrap());
    slow.unlock().await.unwrap();
    assert!(store.get_lock(KEY).await.unwrap().is_none());

    // Renewal stopped with the final release.
    assert!(next.try_lock(Duration::ZERO).await.unwrap());
    next.unlock().await.unwrap();
}

// ============================================================================
// Scoped acquisition
// ============================================================================

#[derive(Debug)]
#[allow(dead_code)]
enum SaleError {
    Lock(LockError),
    OutOfStock,
}

impl From<LockError> for SaleError {
    fn from(err: LockError) -> Self {
        SaleError::Lock(err)
    }
}

#[tokio::test]
async fn test_with_lock_releases_on_section_error() {
    let store = Arc::new(MemoryStore::new());
    let lock = lock_on(&store, fast_config());

    let result: Result<(), SaleError> =
        with_lock(lock.as_ref(), || async { Err(SaleError::OutOfStock) }).await;

    assert!(matches!(result, Err(SaleError::OutOfStock)));
    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_with_lock_releases_on_panic() {
    let store = Arc::new(MemoryStore::new());
    let lock = lock_on(&store, fast_config());

    let task = tokio::spawn({
        let lock = lock.clone();
        async move {
            let fail = true;
            let _: Result<(), LockError> = with_lock(lock.as_ref(), || async move {
                if fail {
                    panic!("critical section blew up");
                }
                Ok(())
            })
            .await;
        }
    });

    let err = task.await.unwrap_err();
    assert!(err.is_panic());
    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_with_lock_timeout_skips_section() {
    let store = Arc::new(MemoryStore::new());
    let holder = lock_on(&store, fast_config());
    let contender = lock_on(&store, fast_config());
    let ran = AtomicUsize::new(0);

    holder.lock().await.unwrap();
    let result: Result<(), LockError> =
        with_lock_timeout(contender.as_ref(), Duration::from_millis(30), || async {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;

    assert!(matches!(
        result,
        Err(LockError::AcquireTimeout { ref key, .. }) if key == KEY
    ));
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(holder.is_held_by_current_context().await.unwrap());
    holder.unlock().await.unwrap();
}

#[tokio::test]
async fn test_with_lock_tolerates_lost_ownership() {
    let store = Arc::new(MemoryStore::new());
    let lock = lock_on(&store, fast_config().with_ttl(Duration::from_millis(30)));

    let sold = with_lock(lock.as_ref(), || async {
        tokio::time::sleep(Duration::from_millis(80)).await;
        Ok::<_, LockError>(7)
    })
    .await
    .unwrap();

    assert_eq!(sold, 7);
}

/// Abort a task while it is inside `with_lock`, then check that another
/// client gets the lock well before the holder's ttl would run out.
async fn assert_aborted_holder_releases(config: LockConfig) {
    let store = Arc::new(MemoryStore::new());
    let holder = lock_on(&store, config.clone());
    let next = lock_on(&store, config);

    let task = tokio::spawn(async move {
        let _: Result<(), LockError> = with_lock(holder.as_ref(), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;
    });
    while store.get_lock(KEY).await.unwrap().is_none() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert!(next.try_lock(Duration::from_millis(500)).await.unwrap());
    next.unlock().await.unwrap();
    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_section_releases_lock() {
    assert_aborted_holder_releases(fast_config()).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_aborted_section_stops_renewal() {
    assert_aborted_holder_releases(
        fast_config()
            .with_ttl(Duration::from_millis(100))
            .with_renewal(Duration::from_millis(30)),
    )
    .await;
}

#[tokio::test]
async fn test_timed_out_inner_section_keeps_outer_hold() {
    let store = Arc::new(MemoryStore::new());
    let lock = lock_on(&store, fast_config());

    with_lock(lock.as_ref(), || async {
        let inner = tokio::time::timeout(
            Duration::from_millis(20),
            with_lock(lock.as_ref(), || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, LockError>(())
            }),
        )
        .await;
        assert!(inner.is_err());

        // Only the inner level is given back.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(lock.hold_count().await?, 1);
        Ok::<_, LockError>(())
    })
    .await
    .unwrap();

    assert!(store.get_lock(KEY).await.unwrap().is_none());
}

// ============================================================================
// Store failures
// ============================================================================

struct UnreachableStore;

#[async_trait]
impl SharedStore for UnreachableStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn delete(&self, _key: &str) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn set_lock_if_absent(
        &self,
        _key: &str,
        _owner: &str,
        _ttl: Duration,
    ) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn get_lock(&self, _key: &str) -> StoreResult<Option<LockRecord>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn increment_hold(&self, _key: &str, _owner: &str) -> StoreResult<Option<u32>> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn release_hold(&self, _key: &str, _owner: &str) -> StoreResult<ReleaseOutcome> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn renew_lease(&self, _key: &str, _owner: &str, _ttl: Duration) -> StoreResult<bool> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_store_failure_is_not_retried() {
    let lock = LockFactory::new(Arc::new(UnreachableStore), fast_config())
        .get_lock(LockBackend::RedisLikeStore)
        .unwrap();

    let started = std::time::Instant::now();
    assert!(matches!(
        lock.lock().await,
        Err(LockError::StoreUnavailable(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(matches!(
        lock.is_held_by_current_context().await,
        Err(LockError::StoreUnavailable(_))
    ));
}
