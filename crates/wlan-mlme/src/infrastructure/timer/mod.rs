//! Timer infrastructure: schedulers behind [`TimerScheduler`].
//!
//! [`TokioScheduler`] spawns one sleeping task per timer.  When the sleep
//! ends the task posts `MlmeEvent::TimerFired(id)` into the event loop;
//! cancelling aborts the task.  An abort can lose the race against an expiry
//! that is already queued, which is why the engine ignores expiries for ids
//! it no longer tracks.
//!
//! [`ManualScheduler`] never fires anything.  Tests look up the id the engine
//! armed and inject the expiry themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;
use wlan_mlme_core::domain::state::TimerId;

use crate::application::events::MlmeEvent;
use crate::application::timers::TimerScheduler;

/// Sleep-task timers on a tokio runtime.
pub struct TokioScheduler {
    events: mpsc::Sender<MlmeEvent>,
    runtime: Handle,
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TimerId, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Creates a scheduler on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(events: mpsc::Sender<MlmeEvent>) -> Self {
        Self::with_handle(events, Handle::current())
    }

    pub fn with_handle(events: mpsc::Sender<MlmeEvent>, runtime: Handle) -> Self {
        Self {
            events,
            runtime,
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn pending(&self) -> usize {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.values().filter(|task| !task.is_finished()).count()
    }
}

impl TimerScheduler for TokioScheduler {
    fn schedule(&self, after: Duration) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(after).await;
            // The loop may already be gone during shutdown.
            let _ = events.send(MlmeEvent::TimerFired(id)).await;
        });
        trace!(timer = id.0, after_ms = after.as_millis() as u64, "timer scheduled");

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|_, task| !task.is_finished());
        tasks.insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = tasks.remove(&id) {
            task.abort();
            trace!(timer = id.0, "timer cancelled");
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, task) in tasks.drain() {
            task.abort();
        }
    }
}

// ── Manual scheduler ──────────────────────────────────────────────────────────

/// Hands out ids and records what was asked of it.
pub struct ManualScheduler {
    next_id: AtomicU64,
    scheduled: Mutex<Vec<(TimerId, Duration)>>,
    cancelled: Mutex<Vec<TimerId>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }

    /// Every `schedule` call so far, oldest first.
    pub fn scheduled(&self) -> Vec<(TimerId, Duration)> {
        self.scheduled.lock().expect("lock poisoned").clone()
    }

    pub fn cancelled(&self) -> Vec<TimerId> {
        self.cancelled.lock().expect("lock poisoned").clone()
    }

    /// Ids scheduled and not cancelled.
    pub fn live(&self) -> Vec<TimerId> {
        let cancelled = self.cancelled();
        self.scheduled()
            .into_iter()
            .map(|(id, _)| id)
            .filter(|id| !cancelled.contains(id))
            .collect()
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler for ManualScheduler {
    fn schedule(&self, after: Duration) -> TimerId {
        let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.scheduled.lock().expect("lock poisoned").push((id, after));
        id
    }

    fn cancel(&self, id: TimerId) {
        self.cancelled.lock().expect("lock poisoned").push(id);
    }
}
