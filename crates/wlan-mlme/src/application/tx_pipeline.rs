//! FrameTxPipeline: builds, sends and tracks management frames.
//!
//! # From request to acknowledgment (for beginners)
//!
//! ```text
//!  build()            send()                 radio               complete()
//! ─────────► FramePlan ──────► TxRequest ──────────► ... ──► TxComplete(token)
//!  seq no.     encode,          token kept                      pending entry
//!  stamped     alloc buffer     in `pending`                    removed
//! ```
//!
//! 1. [`FrameTxPipeline::build`] addresses a frame for a session and stamps
//!    the next 12-bit sequence number.  Nothing is encoded yet, so the caller
//!    may still adjust the plan (WEP-protect it, retarget it to another
//!    channel, attach an optional element).
//! 2. [`FrameTxPipeline::send`] encodes the frame, asks the radio for a
//!    buffer and hands it over together with a fresh [`TxToken`].
//! 3. The radio later reports a [`TxStatus`] for that token and gives the
//!    buffer back.  [`FrameTxPipeline::complete`] returns the
//!    [`PendingFrame`] describing what the frame was for, and the engine
//!    either drops the buffer or hands it to [`FrameTxPipeline::resend`].
//!
//! The pipeline does not decide *whether* to retry; the engine consults the
//! session's retry counters for that.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};
use wlan_mlme_core::domain::session::RetryClass;
use wlan_mlme_core::protocol::ie::VendorIe;
use wlan_mlme_core::protocol::mac::mark_retry;
use wlan_mlme_core::protocol::wep::{self, WepError};
use wlan_mlme_core::protocol::{encode_body, encode_frame, SequenceCounter};
use wlan_mlme_core::{MacAddr, MgmtBody, MgmtFrame, ProtocolError, Session, SessionRef};

/// Largest management frame the pipeline builds by default.
pub const DEFAULT_MAX_FRAME_LEN: usize = 2304;

// ── Radio boundary ────────────────────────────────────────────────────────────

/// Owned frame bytes travelling to the radio and back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TxBuffer(Vec<u8>);

impl TxBuffer {
    pub fn with_capacity(len: usize) -> Self {
        Self(Vec::with_capacity(len))
    }

    /// Replaces the contents with `bytes`.
    pub fn fill(&mut self, bytes: &[u8]) {
        self.0.clear();
        self.0.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for TxBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Identifies one transmission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxToken(pub u64);

/// Outcome the radio reports for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Acked,
    NotAcked,
    SendFailed,
}

/// What a frame is, for retry accounting and completion handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxClass {
    ProbeRequest,
    ProbeResponse,
    /// Station Authentication frames 1 and 3.
    Auth,
    /// Fast-transition Authentication frame 1 to a target AP.
    FtAuth,
    /// SAE commit/confirm supplied by the SME.
    SaeAuth,
    /// AP Authentication frames 2 and 4.
    AuthResponse,
    Assoc,
    Reassoc,
    FtReassoc,
    AssocResponse,
    Deauth,
    Disassoc,
    Action,
}

impl TxClass {
    /// The retry budget a failed transmission of this class draws from.
    pub fn retry_class(self) -> Option<RetryClass> {
        match self {
            TxClass::Auth => Some(RetryClass::Auth),
            TxClass::SaeAuth => Some(RetryClass::SaeAuth),
            TxClass::Reassoc => Some(RetryClass::Reassoc),
            TxClass::FtReassoc => Some(RetryClass::FtReassoc),
            TxClass::Deauth => Some(RetryClass::Deauth),
            _ => None,
        }
    }
}

/// One frame handed to the radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    pub vdev_id: u8,
    pub token: TxToken,
    pub class: TxClass,
    pub buffer: TxBuffer,
    /// Off-channel transmission (fast-transition pre-authentication).
    pub channel: Option<u8>,
}

/// Errors from building or sending a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    /// The radio has no frame buffer available.
    #[error("no transmit buffer available")]
    NoBuffer,

    #[error("frame encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("WEP protection failed: {0}")]
    Wep(#[from] WepError),

    #[error("radio rejected frame: {0}")]
    Radio(String),
}

/// The hardware/firmware transmit path.
///
/// `send` must return immediately; the outcome arrives later as a
/// `TxComplete` event carrying the same token and the buffer.
#[cfg_attr(test, mockall::automock)]
pub trait RadioBackend: Send + Sync {
    /// Reserves a frame buffer of at least `len` bytes.  `None` models
    /// buffer exhaustion.
    fn alloc(&self, len: usize) -> Option<TxBuffer>;

    /// Enqueues a frame.
    fn send(&self, request: TxRequest) -> Result<(), TxError>;
}

// ── Plans and pending frames ──────────────────────────────────────────────────

/// What to do when a frame completes, beyond retry accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    None,
    /// A response frame is expected; the wait timer handles silence.
    AwaitResponse,
    /// Finish a deauthentication or disassociation once the frame is gone.
    FinishDisconnect { deauth: bool },
    /// Finish stopping an AP once the broadcast deauthentication is gone.
    FinishStopBss,
}

/// An addressed, sequence-numbered frame that has not been encoded yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePlan {
    pub sref: SessionRef,
    pub vdev_id: u8,
    pub peer: MacAddr,
    pub class: TxClass,
    pub frame: MgmtFrame,
    pub continuation: Continuation,
    pub channel: Option<u8>,
    optional_ie: Option<VendorIe>,
}

impl FramePlan {
    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = continuation;
        self
    }

    /// Sends on `channel` instead of the session's operating channel.
    pub fn on_channel(mut self, channel: u8) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Addresses the frame to a BSS other than the session's own.
    pub fn with_bssid(mut self, bssid: MacAddr) -> Self {
        self.frame.header.bssid = bssid;
        self
    }

    /// Appends `ie` only if the frame still fits the budget with it.
    pub fn with_optional_ie(mut self, ie: VendorIe) -> Self {
        self.optional_ie = Some(ie);
        self
    }

    /// Replaces the body with its shared-key WEP encryption and sets the
    /// protected bit.
    ///
    /// # Errors
    ///
    /// [`TxError::Encode`] if the body cannot be encoded, [`TxError::Wep`]
    /// for an unusable key.
    pub fn protect_wep(&mut self, key: &[u8], key_id: u8, iv: [u8; 3]) -> Result<(), TxError> {
        let plaintext = encode_body(&self.frame.body)?;
        let bytes = wep::encrypt(key, key_id, iv, &plaintext)?;
        self.frame.body = MgmtBody::Encrypted {
            subtype: self.frame.header.subtype,
            bytes,
        };
        self.frame.header.protected = true;
        Ok(())
    }
}

/// Bookkeeping for a frame the radio still owns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFrame {
    pub sref: SessionRef,
    pub vdev_id: u8,
    pub peer: MacAddr,
    pub class: TxClass,
    pub continuation: Continuation,
    pub channel: Option<u8>,
    /// Resends of this frame so far.
    pub attempts: u8,
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

pub struct FrameTxPipeline {
    radio: Arc<dyn RadioBackend>,
    seq: SequenceCounter,
    pending: HashMap<TxToken, PendingFrame>,
    next_token: u64,
    max_frame_len: usize,
}

impl FrameTxPipeline {
    pub fn new(radio: Arc<dyn RadioBackend>, max_frame_len: usize) -> Self {
        Self {
            radio,
            seq: SequenceCounter::new(),
            pending: HashMap::new(),
            next_token: 1,
            max_frame_len,
        }
    }

    /// Addresses `body` from `session` to `da` and stamps a sequence number.
    pub fn build(&self, session: &Session, da: MacAddr, class: TxClass, body: MgmtBody) -> FramePlan {
        let mut frame = MgmtFrame::new(da, session.self_mac, session.bssid, body);
        frame.header.sequence = self.seq.next();
        FramePlan {
            sref: session.sref,
            vdev_id: session.vdev_id,
            peer: da,
            class,
            frame,
            continuation: Continuation::None,
            channel: None,
            optional_ie: None,
        }
    }

    /// Encodes and enqueues `plan`.
    ///
    /// # Errors
    ///
    /// [`TxError::NoBuffer`] when the radio has no buffer (nothing is left
    /// pending), or the encode/radio error.
    pub fn send(&mut self, plan: FramePlan) -> Result<TxToken, TxError> {
        let bytes = self.encode(&plan)?;
        let Some(mut buffer) = self.radio.alloc(bytes.len()) else {
            warn!(session = %plan.sref, class = ?plan.class, len = bytes.len(), "no transmit buffer");
            return Err(TxError::NoBuffer);
        };
        buffer.fill(&bytes);
        let token = self.allocate_token();
        self.radio.send(TxRequest {
            vdev_id: plan.vdev_id,
            token,
            class: plan.class,
            buffer,
            channel: plan.channel,
        })?;
        trace!(token = token.0, session = %plan.sref, class = ?plan.class, seq = plan.frame.header.sequence, "frame sent");
        self.pending.insert(
            token,
            PendingFrame {
                sref: plan.sref,
                vdev_id: plan.vdev_id,
                peer: plan.peer,
                class: plan.class,
                continuation: plan.continuation,
                channel: plan.channel,
                attempts: 0,
            },
        );
        Ok(token)
    }

    fn encode(&self, plan: &FramePlan) -> Result<Vec<u8>, TxError> {
        let mut bytes = encode_frame(&plan.frame)?;
        if let Some(ie) = &plan.optional_ie {
            if bytes.len() + ie.encoded_len() <= self.max_frame_len {
                ie.write(&mut bytes)?;
            } else {
                debug!(
                    session = %plan.sref,
                    len = bytes.len(),
                    ie_len = ie.encoded_len(),
                    budget = self.max_frame_len,
                    "optional element omitted"
                );
            }
        }
        Ok(bytes)
    }

    fn allocate_token(&mut self) -> TxToken {
        let token = TxToken(self.next_token);
        self.next_token = self.next_token.wrapping_add(1).max(1);
        token
    }

    /// Claims the pending entry for `token`.  Returns `None` for tokens
    /// already completed or forgotten.
    pub fn complete(&mut self, token: TxToken) -> Option<PendingFrame> {
        self.pending.remove(&token)
    }

    /// Sends `buffer` again with the retry bit set.
    ///
    /// # Errors
    ///
    /// Propagates the radio error; the pending entry is dropped in that case.
    pub fn resend(&mut self, mut pending: PendingFrame, mut buffer: TxBuffer) -> Result<TxToken, TxError> {
        mark_retry(buffer.as_mut_slice());
        pending.attempts = pending.attempts.saturating_add(1);
        let token = self.allocate_token();
        self.radio.send(TxRequest {
            vdev_id: pending.vdev_id,
            token,
            class: pending.class,
            buffer,
            channel: pending.channel,
        })?;
        debug!(token = token.0, session = %pending.sref, class = ?pending.class, attempt = pending.attempts, "frame resent");
        self.pending.insert(token, pending);
        Ok(token)
    }

    /// Drops every pending entry of `sref`.  Their completions will be
    /// ignored.
    pub fn forget_session(&mut self, sref: SessionRef) {
        self.pending.retain(|_, p| p.sref != sref);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }
}
