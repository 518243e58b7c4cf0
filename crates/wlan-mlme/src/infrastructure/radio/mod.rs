//! Radio infrastructure: the transmit path behind [`RadioBackend`].
//!
//! # Why a channel in the middle? (for beginners)
//!
//! The engine's `RadioBackend::send` must return immediately; it runs inside
//! the single event-loop task and may not wait for the air.  So
//! [`ChannelRadio`] only pushes the request onto an unbounded queue.  A
//! separate [`RadioWorker`] task drains that queue, hands each frame to a
//! [`RadioTransport`] (the part that actually talks to a driver), and posts
//! the outcome back into the engine as `MlmeEvent::TxComplete`:
//!
//! ```text
//!  MlmeContext ── send() ──► queue ──► RadioWorker ── transmit().await ──► driver
//!       ▲                                   │
//!       └──────── TxComplete(token) ◄───────┘
//! ```
//!
//! The number of frames between `send` and `TxComplete` is bounded by a
//! buffer budget; once it is used up `alloc` returns `None`, which the engine
//! reports as a resource failure.

pub mod mock;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::application::events::MlmeEvent;
use crate::application::tx_pipeline::{RadioBackend, TxBuffer, TxError, TxRequest, TxStatus};

/// Failure reported by a transport for one frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("driver rejected frame: {0}")]
    Rejected(String),

    #[error("radio is down")]
    Down,
}

/// The piece that puts a frame on the air.
///
/// `Ok(TxStatus::Acked)` or `Ok(TxStatus::NotAcked)` reports what the peer
/// did; an `Err` means the frame never left and is reported as
/// `TxStatus::SendFailed`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RadioTransport: Send + Sync {
    async fn transmit(&self, request: &TxRequest) -> Result<TxStatus, TransportError>;
}

/// A transport that acknowledges every frame without sending anything.
///
/// Used by the daemon when no driver is attached.
#[derive(Debug, Default)]
pub struct LoopbackTransport {
    transmitted: AtomicU64,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RadioTransport for LoopbackTransport {
    async fn transmit(&self, request: &TxRequest) -> Result<TxStatus, TransportError> {
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        trace!(
            vdev = request.vdev_id,
            token = request.token.0,
            class = ?request.class,
            len = request.buffer.len(),
            "loopback transmit"
        );
        Ok(TxStatus::Acked)
    }
}

// ── Engine-facing backend ─────────────────────────────────────────────────────

/// [`RadioBackend`] that queues frames for a [`RadioWorker`].
pub struct ChannelRadio {
    queue: mpsc::UnboundedSender<TxRequest>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: usize,
}

impl ChannelRadio {
    /// Creates the backend and the worker that serves it.
    pub fn new(
        transport: Arc<dyn RadioTransport>,
        events: mpsc::Sender<MlmeEvent>,
        max_in_flight: usize,
    ) -> (Self, RadioWorker) {
        let (queue, requests) = mpsc::unbounded_channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let radio = Self {
            queue,
            in_flight: in_flight.clone(),
            max_in_flight,
        };
        let worker = RadioWorker {
            requests,
            transport,
            events,
            in_flight,
        };
        (radio, worker)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl RadioBackend for ChannelRadio {
    fn alloc(&self, len: usize) -> Option<TxBuffer> {
        if self.in_flight() >= self.max_in_flight {
            debug!(in_flight = self.in_flight(), "transmit buffers exhausted");
            return None;
        }
        Some(TxBuffer::with_capacity(len))
    }

    fn send(&self, request: TxRequest) -> Result<(), TxError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.queue.send(request).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            TxError::Radio("radio worker stopped".to_string())
        })
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// Drains the transmit queue in order and reports every completion.
pub struct RadioWorker {
    requests: mpsc::UnboundedReceiver<TxRequest>,
    transport: Arc<dyn RadioTransport>,
    events: mpsc::Sender<MlmeEvent>,
    in_flight: Arc<AtomicUsize>,
}

impl RadioWorker {
    /// Runs until the backend is dropped or the event loop goes away.
    pub async fn run(mut self) {
        while let Some(request) = self.requests.recv().await {
            let status = match self.transport.transmit(&request).await {
                Ok(status) => status,
                Err(e) => {
                    warn!(token = request.token.0, error = %e, "transmit failed");
                    TxStatus::SendFailed
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let event = MlmeEvent::TxComplete {
                token: request.token,
                status,
                buffer: request.buffer,
            };
            if self.events.send(event).await.is_err() {
                debug!("event loop closed; radio worker exiting");
                return;
            }
        }
        debug!("transmit queue closed; radio worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tx_pipeline::{TxClass, TxToken};

    fn request(token: u64) -> TxRequest {
        TxRequest {
            vdev_id: 0,
            token: TxToken(token),
            class: TxClass::Auth,
            buffer: TxBuffer::from(vec![0xb0, 0x00, token as u8]),
            channel: None,
        }
    }

    #[tokio::test]
    async fn test_worker_posts_tx_complete_with_transport_status() {
        // Arrange
        let mut transport = MockRadioTransport::new();
        transport
            .expect_transmit()
            .times(1)
            .returning(|_| Ok(TxStatus::NotAcked));
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (radio, worker) = ChannelRadio::new(Arc::new(transport), events_tx, 4);
        tokio::spawn(worker.run());

        // Act
        radio.send(request(7)).expect("queued");
        let event = events_rx.recv().await.expect("completion");

        // Assert
        assert_eq!(
            event,
            MlmeEvent::TxComplete {
                token: TxToken(7),
                status: TxStatus::NotAcked,
                buffer: TxBuffer::from(vec![0xb0, 0x00, 7]),
            }
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_reported_as_send_failed() {
        // Arrange
        let mut transport = MockRadioTransport::new();
        transport
            .expect_transmit()
            .returning(|_| Err(TransportError::Down));
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (radio, worker) = ChannelRadio::new(Arc::new(transport), events_tx, 4);
        tokio::spawn(worker.run());

        // Act
        radio.send(request(1)).expect("queued");

        // Assert
        match events_rx.recv().await {
            Some(MlmeEvent::TxComplete { status, .. }) => assert_eq!(status, TxStatus::SendFailed),
            other => panic!("expected TxComplete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_completions_keep_send_order() {
        // Arrange
        let transport = Arc::new(LoopbackTransport::new());
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let (radio, worker) = ChannelRadio::new(transport.clone(), events_tx, 8);
        tokio::spawn(worker.run());

        // Act
        for token in 1..=3 {
            radio.send(request(token)).expect("queued");
        }
        let mut tokens = Vec::new();
        for _ in 0..3 {
            if let Some(MlmeEvent::TxComplete { token, .. }) = events_rx.recv().await {
                tokens.push(token.0);
            }
        }

        // Assert
        assert_eq!(tokens, vec![1, 2, 3]);
        assert_eq!(transport.transmitted(), 3);
    }

    #[test]
    fn test_alloc_fails_once_budget_is_used_up() {
        // Arrange: no worker, so nothing ever completes
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (radio, _worker) = ChannelRadio::new(Arc::new(LoopbackTransport::new()), events_tx, 2);

        // Act
        radio.send(request(1)).expect("queued");
        radio.send(request(2)).expect("queued");

        // Assert
        assert_eq!(radio.in_flight(), 2);
        assert!(radio.alloc(64).is_none());
    }

    #[test]
    fn test_send_after_worker_dropped_is_a_radio_error() {
        // Arrange
        let (events_tx, _events_rx) = mpsc::channel(8);
        let (radio, worker) = ChannelRadio::new(Arc::new(LoopbackTransport::new()), events_tx, 2);
        drop(worker);

        // Act
        let result = radio.send(request(1));

        // Assert
        assert!(matches!(result, Err(TxError::Radio(_))));
        assert_eq!(radio.in_flight(), 0);
    }
}
