//! The event loop that owns the engine.
//!
//! # One task, one queue (for beginners)
//!
//! All engine state lives in a single [`MlmeContext`].  Rather than sharing
//! it behind a lock, one tokio task owns it and everything else talks to that
//! task through an `mpsc` queue of [`MlmeEvent`]s:
//!
//! ```text
//!  MlmeHandle (SME, frame ingress) ──┐
//!  RadioWorker (TxComplete) ─────────┤
//!  TokioScheduler (TimerFired) ──────┼──► queue ──► MlmeRuntime::run ──► MlmeContext
//!  TokioScanner (Scan) ──────────────┘
//! ```
//!
//! Because the context handles exactly one event at a time, no two handlers
//! ever observe a half-updated session.  The loop stops when it receives
//! `MlmeEvent::Shutdown`; the adapters hold senders of their own, so dropping
//! every [`MlmeHandle`] does not end it.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::application::context::{EngineConfig, MlmeContext, Ports};
use crate::application::events::{MlmeEvent, SmeRequest};
use crate::application::upstream::UpstreamSink;
use crate::infrastructure::clock::MonotonicClock;
use crate::infrastructure::radio::{ChannelRadio, RadioTransport};
use crate::infrastructure::scan::TokioScanner;
use crate::infrastructure::timer::TokioScheduler;

/// Error type for talking to a running engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    /// The event loop has exited; nothing will process the event.
    #[error("MLME event loop has stopped")]
    Closed,
}

/// Sizes of the queues around the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub event_queue_depth: usize,
    pub tx_buffers: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            event_queue_depth: 256,
            tx_buffers: 64,
        }
    }
}

/// Cloneable sender side of the event loop.
#[derive(Debug, Clone)]
pub struct MlmeHandle {
    events: mpsc::Sender<MlmeEvent>,
}

impl MlmeHandle {
    /// Queues an SME request.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Closed`] once the loop has exited.
    pub async fn submit(&self, request: SmeRequest) -> Result<(), RuntimeError> {
        self.send(MlmeEvent::Sme(request)).await
    }

    /// Queues a management frame received on `vdev_id`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Closed`] once the loop has exited.
    pub async fn deliver_frame(&self, vdev_id: u8, bytes: Vec<u8>) -> Result<(), RuntimeError> {
        self.send(MlmeEvent::RxFrame { vdev_id, bytes }).await
    }

    /// Asks the loop to delete every session and exit.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Closed`] if the loop already exited.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(MlmeEvent::Shutdown).await
    }

    pub async fn send(&self, event: MlmeEvent) -> Result<(), RuntimeError> {
        self.events.send(event).await.map_err(|_| RuntimeError::Closed)
    }
}

/// The engine task.
pub struct MlmeRuntime {
    ctx: MlmeContext,
    events: mpsc::Receiver<MlmeEvent>,
}

impl MlmeRuntime {
    /// Wires the engine to tokio-backed adapters and spawns the radio worker.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        config: EngineConfig,
        options: RuntimeOptions,
        transport: Arc<dyn RadioTransport>,
        upstream: Arc<dyn UpstreamSink>,
    ) -> (Self, MlmeHandle) {
        let (events_tx, events_rx) = mpsc::channel(options.event_queue_depth.max(1));
        let (radio, worker) = ChannelRadio::new(transport, events_tx.clone(), options.tx_buffers);
        tokio::spawn(worker.run());

        let ports = Ports {
            radio: Arc::new(radio),
            timers: Arc::new(TokioScheduler::new(events_tx.clone())),
            scan: Arc::new(TokioScanner::new(events_tx.clone())),
            upstream,
            clock: Arc::new(MonotonicClock::new()),
        };
        let runtime = Self {
            ctx: MlmeContext::new(config, ports),
            events: events_rx,
        };
        (runtime, MlmeHandle { events: events_tx })
    }

    /// Processes events until `Shutdown`.  Returns how many were handled.
    pub async fn run(mut self) -> u64 {
        info!("MLME event loop started");
        let mut handled = 0u64;
        while let Some(event) = self.events.recv().await {
            handled += 1;
            if !self.ctx.handle_event(event) {
                break;
            }
            debug!(handled, pending_tx = self.ctx.pending_tx(), "event handled");
        }
        info!(handled, "MLME event loop stopped");
        handled
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wlan_mlme_core::MacAddr;

    use super::*;
    use crate::application::upstream::{MlmeIndication, ResultCode};
    use crate::infrastructure::radio::LoopbackTransport;
    use crate::infrastructure::storage::config::ApConfig;
    use crate::infrastructure::upstream::ChannelSink;

    const BSSID: MacAddr = MacAddr([0x02, 0, 0, 0, 0x01, 0]);

    fn ap_request() -> SmeRequest {
        let ap = ApConfig {
            ssid: "lab".to_string(),
            bssid: BSSID.to_string(),
            channel: 6,
            beacon_interval: 100,
            max_peers: 0,
        };
        SmeRequest::StartBss(ap.start_params().expect("valid ap table"))
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<MlmeIndication>) -> MlmeIndication {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("indication in time")
            .expect("sink open")
    }

    #[tokio::test]
    async fn test_start_bss_is_confirmed_through_the_loop() {
        // Arrange
        let (sink, mut indications) = ChannelSink::new();
        let (runtime, handle) = MlmeRuntime::new(
            EngineConfig::default(),
            RuntimeOptions::default(),
            Arc::new(LoopbackTransport::new()),
            Arc::new(sink),
        );
        let task = tokio::spawn(runtime.run());

        // Act
        handle.submit(ap_request()).await.expect("loop running");

        // Assert
        assert_eq!(
            next(&mut indications).await,
            MlmeIndication::StartBssCnf {
                bssid: BSSID,
                result: ResultCode::Success,
            }
        );
        handle.shutdown().await.expect("loop running");
        let handled = task.await.expect("loop task");
        assert!(handled >= 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_reports_closed() {
        // Arrange
        let (sink, _indications) = ChannelSink::new();
        let (runtime, handle) = MlmeRuntime::new(
            EngineConfig::default(),
            RuntimeOptions::default(),
            Arc::new(LoopbackTransport::new()),
            Arc::new(sink),
        );
        let task = tokio::spawn(runtime.run());
        handle.shutdown().await.expect("loop running");
        task.await.expect("loop task");

        // Act
        let result = handle.submit(ap_request()).await;

        // Assert
        assert_eq!(result, Err(RuntimeError::Closed));
    }

    #[tokio::test]
    async fn test_auth_timeout_fires_through_tokio_timers() {
        // Arrange: a short auth timeout and a radio that acks but no AP answers
        use crate::application::events::JoinParams;
        use wlan_mlme_core::domain::session::SecurityMaterial;
        use wlan_mlme_core::protocol::frames::{AuthAlgorithm, BeaconBody, CapabilityInfo};
        use wlan_mlme_core::{CapabilitySet, Role};

        let config = EngineConfig {
            auth_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let (sink, mut indications) = ChannelSink::new();
        let (runtime, handle) = MlmeRuntime::new(
            config,
            RuntimeOptions::default(),
            Arc::new(LoopbackTransport::new()),
            Arc::new(sink),
        );
        let task = tokio::spawn(runtime.run());
        let rates = vec![0x82, 0x84, 0x8b, 0x96];
        let join = JoinParams {
            vdev_id: 0,
            self_mac: MacAddr([0x02, 0, 0, 0, 0, 0x10]),
            bssid: BSSID,
            ssid: b"lab".to_vec(),
            channel: 6,
            ch_width_40: false,
            role: Role::Sta,
            caps: CapabilitySet {
                rates: rates.clone(),
                ..CapabilitySet::default()
            },
            auth_algorithm: AuthAlgorithm::OpenSystem,
            security: SecurityMaterial::default(),
            beacon: Some(BeaconBody {
                beacon_interval: 100,
                capability: CapabilityInfo(CapabilityInfo::ESS),
                ssid: b"lab".to_vec(),
                rates,
                channel: Some(6),
                ..BeaconBody::default()
            }),
            listen_interval: 0,
        };

        // Act
        handle.submit(SmeRequest::Join(join)).await.expect("loop running");

        // Assert
        assert_eq!(
            next(&mut indications).await,
            MlmeIndication::JoinCnf {
                bssid: BSSID,
                result: ResultCode::Success,
            }
        );
        assert_eq!(
            next(&mut indications).await,
            MlmeIndication::AuthCnf {
                bssid: BSSID,
                algorithm: AuthAlgorithm::OpenSystem,
                result: ResultCode::Timeout,
            }
        );
        handle.shutdown().await.expect("loop running");
        task.await.expect("loop task");
    }
}
