//! Sinks for confirmations and indications bound for the SME.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::application::upstream::{MlmeIndication, UpstreamSink};

/// Forwards every indication to an SME task over a channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<MlmeIndication>,
}

impl ChannelSink {
    /// Creates the sink and the receiving end for the SME.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MlmeIndication>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UpstreamSink for ChannelSink {
    fn post(&self, indication: MlmeIndication) {
        if let Err(e) = self.tx.send(indication) {
            warn!(indication = ?e.0, "SME receiver dropped; indication lost");
        }
    }
}

/// Logs every indication.  Used by the daemon when no SME is attached.
#[derive(Debug, Default)]
pub struct LogSink;

impl UpstreamSink for LogSink {
    fn post(&self, indication: MlmeIndication) {
        info!(?indication, "MLME indication");
    }
}

/// Collects indications for assertions.
pub struct RecordingUpstream {
    posted: Mutex<Vec<MlmeIndication>>,
}

impl RecordingUpstream {
    pub fn new() -> Self {
        Self {
            posted: Mutex::new(Vec::new()),
        }
    }

    /// Everything posted so far, oldest first.
    pub fn posted(&self) -> Vec<MlmeIndication> {
        self.posted.lock().expect("lock poisoned").clone()
    }

    pub fn last(&self) -> Option<MlmeIndication> {
        self.posted.lock().expect("lock poisoned").last().cloned()
    }

    pub fn clear(&self) {
        self.posted.lock().expect("lock poisoned").clear();
    }
}

impl Default for RecordingUpstream {
    fn default() -> Self {
        Self::new()
    }
}

impl UpstreamSink for RecordingUpstream {
    fn post(&self, indication: MlmeIndication) {
        self.posted.lock().expect("lock poisoned").push(indication);
    }
}
