//! RetryTimerSet: bookkeeping for every timer the engine arms.
//!
//! # One timer per key (for beginners)
//!
//! The engine arms timers for many reasons: waiting for an Authentication
//! response, waiting for shared-key frame 3 from one particular station, the
//! periodic overlap-protection decay, and so on.  The rule is simple: for a
//! given [`TimerKey`] (session, class, optional peer) at most one timer is
//! armed.  Arming again replaces the old timer; cancelling an unarmed key is
//! a no-op.
//!
//! Cancellation races with expiry.  A timer may fire after it was
//! cancelled, because the expiry was already queued.  [`RetryTimerSet::fired`]
//! only returns a key for ids it still tracks, so such late expiries are
//! ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};
use wlan_mlme_core::domain::state::TimerId;
use wlan_mlme_core::{MacAddr, SessionRef, TimerClass};

/// Schedules and cancels expiries.  An expiry re-enters the engine as
/// `MlmeEvent::TimerFired(id)`.
#[cfg_attr(test, mockall::automock)]
pub trait TimerScheduler: Send + Sync {
    fn schedule(&self, after: Duration) -> TimerId;
    fn cancel(&self, id: TimerId);
}

/// What a timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerKey {
    pub session: SessionRef,
    pub class: TimerClass,
    pub peer: Option<MacAddr>,
}

impl TimerKey {
    pub fn session(session: SessionRef, class: TimerClass) -> Self {
        Self {
            session,
            class,
            peer: None,
        }
    }

    pub fn peer(session: SessionRef, class: TimerClass, peer: MacAddr) -> Self {
        Self {
            session,
            class,
            peer: Some(peer),
        }
    }
}

/// Armed timers indexed both ways.
pub struct RetryTimerSet {
    scheduler: Arc<dyn TimerScheduler>,
    armed: HashMap<TimerKey, TimerId>,
    keys: HashMap<TimerId, TimerKey>,
}

impl RetryTimerSet {
    pub fn new(scheduler: Arc<dyn TimerScheduler>) -> Self {
        Self {
            scheduler,
            armed: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Arms `key`, replacing any timer already armed for it.
    pub fn arm(&mut self, key: TimerKey, after: Duration) -> TimerId {
        self.cancel(&key);
        let id = self.scheduler.schedule(after);
        trace!(timer = id.0, class = ?key.class, session = %key.session, ?after, "timer armed");
        self.armed.insert(key, id);
        self.keys.insert(id, key);
        id
    }

    /// Cancels `key`.  Returns whether a timer was armed.
    pub fn cancel(&mut self, key: &TimerKey) -> bool {
        match self.armed.remove(key) {
            Some(id) => {
                self.keys.remove(&id);
                self.scheduler.cancel(id);
                trace!(timer = id.0, class = ?key.class, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels by id (timers handed back by the pre-auth registry).
    pub fn cancel_id(&mut self, id: TimerId) -> bool {
        match self.keys.get(&id).copied() {
            Some(key) => self.cancel(&key),
            None => false,
        }
    }

    /// Cancels every timer owned by `session`.
    pub fn cancel_session(&mut self, session: SessionRef) {
        let keys: Vec<TimerKey> = self.armed.keys().filter(|k| k.session == session).copied().collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    /// Consumes an expiry.  Returns `None` for ids that were cancelled (or
    /// replaced) before the expiry was processed.
    pub fn fired(&mut self, id: TimerId) -> Option<TimerKey> {
        let Some(key) = self.keys.remove(&id) else {
            debug!(timer = id.0, "expiry for a timer no longer armed");
            return None;
        };
        self.armed.remove(&key);
        Some(key)
    }

    pub fn is_armed(&self, key: &TimerKey) -> bool {
        self.armed.contains_key(key)
    }

    pub fn armed_id(&self, key: &TimerKey) -> Option<TimerId> {
        self.armed.get(key).copied()
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Number of armed timers of `class` for `session` (any peer).
    pub fn count_for(&self, session: SessionRef, class: TimerClass) -> usize {
        self.armed.keys().filter(|k| k.session == session && k.class == class).count()
    }
}
