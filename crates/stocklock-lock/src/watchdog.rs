//! Opt-in lease renewal.
//!
//! The base lock never renews its lease: a critical section that outlives the
//! ttl can overlap with the next acquirer. When `LockConfig::renewal` is set, a
//! watchdog task re-arms the expiry every interval for as long as the owning
//! context holds the lock.

use std::sync::Arc;
use std::time::Duration;

use stocklock_store::SharedStore;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};

/// Stops the watchdog when dropped.
pub struct WatchdogHandle {
    _stop_tx: mpsc::Sender<()>,
}

/// Background renewal task for one acquisition.
pub struct LeaseWatchdog {
    store: Arc<dyn SharedStore>,
    key: String,
    owner: String,
    ttl: Duration,
    interval: Duration,
}

impl LeaseWatchdog {
    pub fn new(
        store: Arc<dyn SharedStore>,
        key: impl Into<String>,
        owner: impl Into<String>,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            owner: owner.into(),
            ttl,
            interval,
        }
    }

    /// Spawn the renewal loop on the current tokio runtime.
    pub fn spawn(self) -> WatchdogHandle {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        tokio::spawn(self.run(stop_rx));
        WatchdogHandle { _stop_tx: stop_tx }
    }

    async fn run(self, mut stop_rx: mpsc::Receiver<()>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the lease was just set.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.store.renew_lease(&self.key, &self.owner, self.ttl).await {
                        Ok(true) => {
                            tracing::trace!(key = %self.key, owner = %self.owner, "Lock lease renewed");
                        }
                        Ok(false) => {
                            tracing::warn!(
                                key = %self.key,
                                owner = %self.owner,
                                "Lock lease renewal failed: record is no longer owned"
                            );
                            break;
                        }
                        Err(e) => {
                            tracing::error!(key = %self.key, owner = %self.owner, "Lock lease renewal error: {}", e);
                            break;
                        }
                    }
                }
                _ = stop_rx.recv() => {
                    break;
                }
            }
        }
    }
}
