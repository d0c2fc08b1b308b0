use std::sync::Arc;

use stocklock_lock::{DistributedLock, LockBackend, LockFactory, LockResult, with_lock};
use stocklock_store::SharedStore;
use tracing::{debug, info};

use crate::{InventoryError, InventoryResult, SaleOutcome};

/// Default store key of the stock counter
pub const DEFAULT_INVENTORY_KEY: &str = "inventory";

/// Sells units of a single stock counter.
///
/// The counter is only touched inside [`with_lock`], so concurrent sales across
/// every instance sharing the store are serialized and the lock is released on
/// every exit path.
pub struct InventoryService {
    store: Arc<dyn SharedStore>,
    lock: Arc<dyn DistributedLock>,
    inventory_key: String,
    port: u16,
}

impl InventoryService {
    pub fn new(
        store: Arc<dyn SharedStore>,
        lock: Arc<dyn DistributedLock>,
        inventory_key: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            store,
            lock,
            inventory_key: inventory_key.into(),
            port,
        }
    }

    /// Build the service with a lock for `backend` from `factory`.
    pub fn from_factory(
        store: Arc<dyn SharedStore>,
        factory: &LockFactory,
        backend: LockBackend,
        inventory_key: impl Into<String>,
        port: u16,
    ) -> LockResult<Self> {
        let lock = factory.get_lock(backend)?;
        Ok(Self::new(store, lock, inventory_key, port))
    }

    pub fn inventory_key(&self) -> &str {
        &self.inventory_key
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Sell one unit if any stock is left.
    pub async fn sale(&self) -> InventoryResult<SaleOutcome> {
        with_lock(self.lock.as_ref(), || self.sell_one()).await
    }

    /// Current stock, read under the lock.
    pub async fn stock(&self) -> InventoryResult<u64> {
        with_lock(self.lock.as_ref(), || self.read_counter()).await
    }

    async fn sell_one(&self) -> InventoryResult<SaleOutcome> {
        let stock = self.read_counter().await?;
        if stock == 0 {
            debug!(key = %self.inventory_key, "Sale rejected: insufficient stock");
            return Ok(SaleOutcome::InsufficientStock);
        }

        let remaining = stock - 1;
        self.store
            .set(&self.inventory_key, &remaining.to_string())
            .await?;

        let outcome = SaleOutcome::Sold {
            remaining,
            port: self.port,
        };
        info!(key = %self.inventory_key, remaining, "{}", outcome);
        Ok(outcome)
    }

    /// Absent counter reads as 0.
    async fn read_counter(&self) -> InventoryResult<u64> {
        match self.store.get(&self.inventory_key).await? {
            None => Ok(0),
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map_err(|_| InventoryError::MalformedCounter {
                    key: self.inventory_key.clone(),
                    value,
                }),
        }
    }
}
