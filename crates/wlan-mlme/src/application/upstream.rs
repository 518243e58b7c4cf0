//! Messages the engine posts to the upstream SME.
//!
//! Every SME request eventually produces exactly one confirmation (`*Cnf`),
//! and every unsolicited event the SME must know about produces an
//! indication (`*Ind`).  Failures never cross this boundary as Rust errors:
//! they are flattened into a [`ResultCode`].

use wlan_mlme_core::protocol::frames::{ActionFrame, AuthAlgorithm, Authentication, ReasonCode, StatusCode};
use wlan_mlme_core::{BeaconUpdate, MacAddr};

/// Outcome carried by confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    /// Generic failure, for example a scan that could not start.
    Failure,
    /// Session pool, peer table, pre-auth registry or transmit buffers
    /// exhausted.
    ResourcesUnavailable,
    /// The peer did not answer in time.
    Timeout,
    /// The peer answered with a failure status.
    Refused(StatusCode),
    /// Retries exhausted without an acknowledgment.
    TxFailed,
    /// The request is not valid in the session's current state.
    InvalidState,
    InvalidParameters,
}

impl ResultCode {
    pub fn is_success(&self) -> bool {
        *self == ResultCode::Success
    }
}

/// Confirmation or indication posted to the SME.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlmeIndication {
    JoinCnf {
        bssid: MacAddr,
        result: ResultCode,
    },
    StartBssCnf {
        bssid: MacAddr,
        result: ResultCode,
    },
    StopBssCnf {
        bssid: MacAddr,
        result: ResultCode,
    },
    AuthCnf {
        bssid: MacAddr,
        algorithm: AuthAlgorithm,
        result: ResultCode,
    },
    /// AP: a station completed open-system or shared-key authentication.
    AuthInd {
        bssid: MacAddr,
        peer: MacAddr,
        algorithm: AuthAlgorithm,
    },
    /// SAE (or over-the-air FT at an AP) frame for the SME to process.
    AuthFrameInd {
        bssid: MacAddr,
        peer: MacAddr,
        frame: Authentication,
    },
    AssocCnf {
        bssid: MacAddr,
        aid: u16,
        result: ResultCode,
    },
    ReassocCnf {
        bssid: MacAddr,
        aid: u16,
        result: ResultCode,
    },
    /// AP: a station (re)associated.
    AssocInd {
        bssid: MacAddr,
        peer: MacAddr,
        aid: u16,
        reassoc: bool,
        rsn: Option<Vec<u8>>,
    },
    DeauthCnf {
        bssid: MacAddr,
        peer: MacAddr,
        result: ResultCode,
    },
    DeauthInd {
        bssid: MacAddr,
        peer: MacAddr,
        reason: ReasonCode,
    },
    DisassocCnf {
        bssid: MacAddr,
        peer: MacAddr,
        result: ResultCode,
    },
    DisassocInd {
        bssid: MacAddr,
        peer: MacAddr,
        reason: ReasonCode,
    },
    FtPreauthRsp {
        bssid: MacAddr,
        target: MacAddr,
        result: ResultCode,
        /// FT elements from the target's Authentication frame 2.
        ies: Vec<u8>,
    },
    BeaconParamsChanged {
        bssid: MacAddr,
        update: BeaconUpdate,
    },
    SaQueryTimeout {
        bssid: MacAddr,
        peer: MacAddr,
    },
    /// Shared-key Authentication frame 3 failed WEP decryption.
    DecryptFailure {
        bssid: MacAddr,
        peer: MacAddr,
    },
    ChannelSwitched {
        bssid: MacAddr,
        channel: u8,
    },
    ActionFrameInd {
        bssid: MacAddr,
        peer: MacAddr,
        action: ActionFrame,
    },
}

/// Where indications go.
///
/// Infrastructure implementations forward to a channel or a log; the
/// recording implementation collects them for assertions.
#[cfg_attr(test, mockall::automock)]
pub trait UpstreamSink: Send + Sync {
    fn post(&self, indication: MlmeIndication);
}
