use std::time::Duration;

use tracing::warn;

/// Default lock key: one global lock protecting the inventory counter
pub const DEFAULT_LOCK_KEY: &str = "stocklock:inventory:lock";

/// Default lease: long enough for a typical critical section, short enough
/// that a crashed holder's record heals on its own
pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Default delay between contended acquisition attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Tunables for a store-backed lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Key of the lock record in the shared store
    pub key: String,
    /// Store-side expiry of the lock record
    pub ttl: Duration,
    /// Fixed backoff between attempts
    pub retry_delay: Duration,
    /// Upper bound of random extra delay added to each backoff
    pub retry_jitter: Duration,
    /// Lease renewal interval; `None` disables the watchdog
    pub renewal: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_LOCK_KEY.to_string(),
            ttl: DEFAULT_TTL,
            retry_delay: DEFAULT_RETRY_DELAY,
            retry_jitter: Duration::ZERO,
            renewal: None,
        }
    }
}

impl LockConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Set the lease. Drops a renewal interval that no longer fits inside it.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        if let Some(interval) = self.renewal.filter(|interval| !renews_in_time(*interval, ttl)) {
            warn!(key = %self.key, ?interval, ?ttl, "Lease renewal disabled: interval does not fit the new ttl");
            self.renewal = None;
        }
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_retry_jitter(mut self, retry_jitter: Duration) -> Self {
        self.retry_jitter = retry_jitter;
        self
    }

    /// Enable lease renewal every `interval`. A zero interval, or one that is
    /// not shorter than the ttl, is rejected with a warning and leaves renewal
    /// off.
    pub fn with_renewal(mut self, interval: Duration) -> Self {
        if renews_in_time(interval, self.ttl) {
            self.renewal = Some(interval);
        } else {
            warn!(key = %self.key, ?interval, ttl = ?self.ttl, "Lease renewal rejected: interval must be non-zero and shorter than the ttl");
            self.renewal = None;
        }
        self
    }

    /// Delay before the next attempt: the fixed backoff plus up to
    /// `retry_jitter` of random extra.
    pub fn backoff(&self) -> Duration {
        if self.retry_jitter.is_zero() {
            return self.retry_delay;
        }
        let jitter_ms = self.retry_jitter.as_millis() as u64;
        self.retry_delay + Duration::from_millis(rand::random_range(0..=jitter_ms))
    }
}

fn renews_in_time(interval: Duration, ttl: Duration) -> bool {
    !interval.is_zero() && interval < ttl
}
