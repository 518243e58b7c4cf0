//! Recording radio for tests.
//!
//! Keeps every [`TxRequest`] handed to it and never completes anything on
//! its own; the test decides which status each frame gets by feeding a
//! `TxComplete` event back into the engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::application::tx_pipeline::{RadioBackend, TxBuffer, TxError, TxRequest};

/// A [`RadioBackend`] that records frames instead of sending them.
pub struct RecordingRadio {
    sent: Mutex<Vec<TxRequest>>,
    alloc_fail: AtomicBool,
    send_fail: AtomicBool,
}

impl RecordingRadio {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            alloc_fail: AtomicBool::new(false),
            send_fail: AtomicBool::new(false),
        }
    }

    /// Every request sent so far, oldest first.
    pub fn sent(&self) -> Vec<TxRequest> {
        self.sent.lock().expect("lock poisoned").clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().expect("lock poisoned").len()
    }

    /// Removes and returns everything recorded so far.
    pub fn take_sent(&self) -> Vec<TxRequest> {
        std::mem::take(&mut *self.sent.lock().expect("lock poisoned"))
    }

    /// While set, `alloc` reports buffer exhaustion.
    pub fn set_alloc_fail(&self, fail: bool) {
        self.alloc_fail.store(fail, Ordering::SeqCst);
    }

    /// While set, `send` rejects frames.
    pub fn set_send_fail(&self, fail: bool) {
        self.send_fail.store(fail, Ordering::SeqCst);
    }
}

impl Default for RecordingRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioBackend for RecordingRadio {
    fn alloc(&self, len: usize) -> Option<TxBuffer> {
        if self.alloc_fail.load(Ordering::SeqCst) {
            return None;
        }
        Some(TxBuffer::with_capacity(len))
    }

    fn send(&self, request: TxRequest) -> Result<(), TxError> {
        if self.send_fail.load(Ordering::SeqCst) {
            return Err(TxError::Radio("injected failure".to_string()));
        }
        self.sent.lock().expect("lock poisoned").push(request);
        Ok(())
    }
}
