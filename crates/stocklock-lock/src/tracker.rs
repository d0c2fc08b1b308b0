//! Process-local bookkeeping of which context holds which token.
//!
//! The hold count lives in the store record only; the tracker remembers the
//! token each context must present on release and keeps its watchdog alive.
//! The mutex guards this map and nothing else: it is never held across a
//! store round trip.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::token::{ContextId, LockToken};
use crate::watchdog::WatchdogHandle;

struct Held {
    token: LockToken,
    _watchdog: Option<WatchdogHandle>,
}

#[derive(Default)]
pub struct ReentrancyTracker {
    held: Mutex<HashMap<ContextId, Held>>,
}

impl ReentrancyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh acquisition. Replaces any stale entry the
    /// context had from a lease that expired underneath it, stopping its
    /// watchdog.
    pub fn acquired(&self, token: LockToken, watchdog: Option<WatchdogHandle>) {
        self.held.lock().insert(
            token.context().clone(),
            Held {
                token,
                _watchdog: watchdog,
            },
        );
    }

    /// Record a reentrant acquisition of the record owned by `token`. Keeps
    /// the existing entry, and its watchdog, when it already holds that token.
    pub fn reentered(&self, token: LockToken) {
        let mut held = self.held.lock();
        if held
            .get(token.context())
            .is_some_and(|entry| entry.token == token)
        {
            return;
        }
        held.insert(
            token.context().clone(),
            Held {
                token,
                _watchdog: None,
            },
        );
    }

    /// Token the context must present to release, if it believes it holds
    /// the lock.
    pub fn token_for(&self, context: &ContextId) -> Option<LockToken> {
        self.held.lock().get(context).map(|entry| entry.token.clone())
    }

    /// Forget the acquisition made under `token` (final release, or ownership
    /// lost). Drops the watchdog handle, which stops renewal. An entry the
    /// context has since replaced with a newer token is left alone.
    pub fn forget(&self, token: &LockToken) {
        let mut held = self.held.lock();
        if held
            .get(token.context())
            .is_some_and(|entry| &entry.token == token)
        {
            held.remove(token.context());
        }
    }
}
