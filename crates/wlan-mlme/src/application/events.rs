//! Inbound events and SME requests.
//!
//! Everything that can change engine state arrives as one [`MlmeEvent`]:
//! received frames, transmit completions, timer expiries, scan progress,
//! and requests from the SME.  The context processes them one at a time.

use wlan_mlme_core::domain::session::{Role, SecurityMaterial};
use wlan_mlme_core::domain::state::TimerId;
use wlan_mlme_core::protocol::frames::{ActionFrame, AuthAlgorithm, Authentication, BeaconBody, ReasonCode, StatusCode};
use wlan_mlme_core::protocol::ie::{MobilityDomain, VendorIe};
use wlan_mlme_core::{CapabilitySet, MacAddr};

use crate::application::tx_pipeline::{TxBuffer, TxStatus, TxToken};

/// Progress reported by the scan service for a scan the engine requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent {
    Started { scan_id: u32 },
    /// The radio is now dwelling on `channel`, away from the home channel.
    ForeignChannel { scan_id: u32, channel: u8 },
    Completed { scan_id: u32 },
    StartFailed { scan_id: u32 },
}

impl ScanEvent {
    pub fn scan_id(&self) -> u32 {
        match *self {
            ScanEvent::Started { scan_id }
            | ScanEvent::ForeignChannel { scan_id, .. }
            | ScanEvent::Completed { scan_id }
            | ScanEvent::StartFailed { scan_id } => scan_id,
        }
    }
}

/// Station join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinParams {
    pub vdev_id: u8,
    pub self_mac: MacAddr,
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub channel: u8,
    pub ch_width_40: bool,
    pub role: Role,
    pub caps: CapabilitySet,
    pub auth_algorithm: AuthAlgorithm,
    pub security: SecurityMaterial,
    /// Beacon or probe response already received from the BSS.  When
    /// present the join completes without waiting for a beacon.
    pub beacon: Option<BeaconBody>,
    pub listen_interval: u16,
}

/// AP start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartBssParams {
    pub vdev_id: u8,
    pub self_mac: MacAddr,
    pub bssid: MacAddr,
    pub ssid: Vec<u8>,
    pub channel: u8,
    pub ch_width_40: bool,
    pub beacon_interval: u16,
    pub role: Role,
    pub caps: CapabilitySet,
    pub security: SecurityMaterial,
    pub max_peers: usize,
    pub rifs_permitted: bool,
    /// P2P notice-of-absence attribute for a group owner.
    pub noa: Option<VendorIe>,
}

/// Requests from the SME.  Sessions are addressed by BSSID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmeRequest {
    Join(JoinParams),
    /// Reassociate with the BSS the session is linked to.
    Reassoc { bssid: MacAddr },
    /// The SME finished key setup; the link is usable.
    SetLinkState { bssid: MacAddr },
    Deauth {
        bssid: MacAddr,
        peer: MacAddr,
        reason: ReasonCode,
    },
    Disassoc {
        bssid: MacAddr,
        peer: MacAddr,
        reason: ReasonCode,
    },
    StartBss(StartBssParams),
    StopBss { bssid: MacAddr },
    /// Start 802.11r pre-authentication with `target_bssid`.
    FtPreauth {
        bssid: MacAddr,
        target_bssid: MacAddr,
        target_channel: u8,
        mde: Option<MobilityDomain>,
        ft_ies: Vec<u8>,
    },
    /// An SAE frame built by the SME.
    SendAuthFrame {
        bssid: MacAddr,
        peer: MacAddr,
        frame: Authentication,
    },
    /// AP: the SME finished an SAE (or FT) exchange with `peer`.
    AuthComplete {
        bssid: MacAddr,
        peer: MacAddr,
        status: StatusCode,
    },
    SendAction {
        bssid: MacAddr,
        peer: MacAddr,
        action: ActionFrame,
    },
    /// Vendor elements to carry in the next deauthentication or
    /// disassociation of this session.
    SetDisconnectIes { bssid: MacAddr, ies: Vec<VendorIe> },
}

impl SmeRequest {
    /// The BSSID the request addresses.
    pub fn bssid(&self) -> MacAddr {
        match self {
            SmeRequest::Join(p) => p.bssid,
            SmeRequest::StartBss(p) => p.bssid,
            SmeRequest::Reassoc { bssid }
            | SmeRequest::SetLinkState { bssid }
            | SmeRequest::Deauth { bssid, .. }
            | SmeRequest::Disassoc { bssid, .. }
            | SmeRequest::StopBss { bssid }
            | SmeRequest::FtPreauth { bssid, .. }
            | SmeRequest::SendAuthFrame { bssid, .. }
            | SmeRequest::AuthComplete { bssid, .. }
            | SmeRequest::SendAction { bssid, .. }
            | SmeRequest::SetDisconnectIes { bssid, .. } => *bssid,
        }
    }
}

/// One unit of work for the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MlmeEvent {
    RxFrame { vdev_id: u8, bytes: Vec<u8> },
    TxComplete {
        token: TxToken,
        status: TxStatus,
        buffer: TxBuffer,
    },
    TimerFired(TimerId),
    Scan(ScanEvent),
    Sme(SmeRequest),
    /// Stop the event loop.
    Shutdown,
}
