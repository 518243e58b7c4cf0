//! Scan infrastructure: services behind [`ScanService`].
//!
//! The engine only scans for 802.11r pre-authentication: it needs the radio
//! parked on the target channel long enough to send Authentication frame 1
//! and hear the answer.  [`TokioScanner`] reports the dwell as
//! `Started`, `ForeignChannel` and, after the dwell time, `Completed`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::events::{MlmeEvent, ScanEvent};
use crate::application::ft_handoff::{ScanRequest, ScanService};

/// Single-channel dwells driven by tokio timers.
pub struct TokioScanner {
    events: mpsc::Sender<MlmeEvent>,
    runtime: Handle,
    next_id: AtomicU32,
}

impl TokioScanner {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(events: mpsc::Sender<MlmeEvent>) -> Self {
        Self {
            events,
            runtime: Handle::current(),
            next_id: AtomicU32::new(1),
        }
    }
}

impl ScanService for TokioScanner {
    fn request_scan(&self, request: ScanRequest) -> u32 {
        let scan_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let events = self.events.clone();
        debug!(
            scan_id,
            requester = request.requester.0,
            channel = request.channel,
            dwell_ms = request.dwell.as_millis() as u64,
            "scan requested"
        );
        self.runtime.spawn(async move {
            let steps = [
                ScanEvent::Started { scan_id },
                ScanEvent::ForeignChannel {
                    scan_id,
                    channel: request.channel,
                },
            ];
            for step in steps {
                if events.send(MlmeEvent::Scan(step)).await.is_err() {
                    return;
                }
            }
            tokio::time::sleep(request.dwell).await;
            let _ = events.send(MlmeEvent::Scan(ScanEvent::Completed { scan_id })).await;
        });
        scan_id
    }
}

// ── Recording scanner ─────────────────────────────────────────────────────────

/// Records requests and reports nothing; tests inject the scan events.
pub struct RecordingScan {
    next_id: AtomicU32,
    requests: Mutex<Vec<(u32, ScanRequest)>>,
}

impl RecordingScan {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ScanRequest> {
        let requests = self.requests.lock().expect("lock poisoned");
        requests.iter().map(|(_, request)| *request).collect()
    }

    /// The id handed out for the most recent request.
    pub fn last_scan_id(&self) -> Option<u32> {
        let requests = self.requests.lock().expect("lock poisoned");
        requests.last().map(|(id, _)| *id)
    }
}

impl Default for RecordingScan {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanService for RecordingScan {
    fn request_scan(&self, request: ScanRequest) -> u32 {
        let scan_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().expect("lock poisoned").push((scan_id, request));
        scan_id
    }
}
