//! Typed management frame bodies.
//!
//! Each struct here mirrors one management frame subtype: the fixed fields
//! come first, then the information elements the MLME cares about.  Elements
//! the MLME does not interpret are dropped on decode; elements it forwards
//! without interpreting (RSN, FT, SAE payloads) are kept as opaque bytes.

use crate::protocol::ie::{
    ChannelSwitchAnnouncement, ErpInfo, ExtChannelSwitchAnnouncement, HeCapabilities,
    HtCapabilities, HtOperation, MobilityDomain, VendorIe, VhtCapabilities,
};
use crate::protocol::mac::{MacAddr, MgmtHeader, MgmtSubtype};

// ── Fixed-field codes ─────────────────────────────────────────────────────────

/// Authentication algorithm number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AuthAlgorithm {
    OpenSystem = 0,
    SharedKey = 1,
    FastTransition = 2,
    Sae = 3,
}

impl TryFrom<u16> for AuthAlgorithm {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, ()> {
        match value {
            0 => Ok(AuthAlgorithm::OpenSystem),
            1 => Ok(AuthAlgorithm::SharedKey),
            2 => Ok(AuthAlgorithm::FastTransition),
            3 => Ok(AuthAlgorithm::Sae),
            _ => Err(()),
        }
    }
}

/// 802.11 status code carried in responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(0);
    pub const UNSPECIFIED_FAILURE: StatusCode = StatusCode(1);
    pub const CAPABILITIES_UNSUPPORTED: StatusCode = StatusCode(10);
    pub const REASSOC_DENIED_NO_ASSOCIATION: StatusCode = StatusCode(11);
    pub const UNSUPPORTED_AUTH_ALGORITHM: StatusCode = StatusCode(13);
    pub const AUTH_SEQUENCE_OUT_OF_ORDER: StatusCode = StatusCode(14);
    pub const CHALLENGE_FAILURE: StatusCode = StatusCode(15);
    pub const AUTH_TIMEOUT: StatusCode = StatusCode(16);
    pub const AP_UNABLE_TO_HANDLE_NEW_STA: StatusCode = StatusCode(17);
    pub const BASIC_RATES_MISMATCH: StatusCode = StatusCode(18);
    pub const REFUSED_TEMPORARILY: StatusCode = StatusCode(30);
    pub const ROBUST_MGMT_POLICY_VIOLATION: StatusCode = StatusCode(31);
    pub const INVALID_ELEMENT: StatusCode = StatusCode(40);
    pub const INVALID_PMKID: StatusCode = StatusCode(53);
    pub const INVALID_MDE: StatusCode = StatusCode(54);
    pub const INVALID_FTE: StatusCode = StatusCode(55);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

/// 802.11 reason code carried in deauthentication / disassociation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode(pub u16);

impl ReasonCode {
    pub const UNSPECIFIED: ReasonCode = ReasonCode(1);
    pub const INVALID_AUTHENTICATION: ReasonCode = ReasonCode(2);
    pub const LEAVING_NETWORK_DEAUTH: ReasonCode = ReasonCode(3);
    pub const INACTIVITY: ReasonCode = ReasonCode(4);
    pub const NO_MORE_STAS: ReasonCode = ReasonCode(5);
    pub const CLASS2_FRAME_FROM_NONAUTH_STA: ReasonCode = ReasonCode(6);
    pub const CLASS3_FRAME_FROM_NONASSOC_STA: ReasonCode = ReasonCode(7);
    pub const LEAVING_NETWORK_DISASSOC: ReasonCode = ReasonCode(8);
    pub const NOT_AUTHENTICATED: ReasonCode = ReasonCode(9);
    pub const STA_LEAVING: ReasonCode = ReasonCode(36);
    pub const TIMEOUT: ReasonCode = ReasonCode(39);
}

/// Capability Information fixed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilityInfo(pub u16);

impl CapabilityInfo {
    pub const ESS: u16 = 0x0001;
    pub const IBSS: u16 = 0x0002;
    pub const PRIVACY: u16 = 0x0010;
    pub const SHORT_PREAMBLE: u16 = 0x0020;
    pub const SPECTRUM_MGMT: u16 = 0x0100;
    pub const QOS: u16 = 0x0200;
    pub const SHORT_SLOT_TIME: u16 = 0x0400;
    pub const RADIO_MEASUREMENT: u16 = 0x1000;

    pub fn has(&self, bit: u16) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u16) -> Self {
        Self(self.0 | bit)
    }
}

// ── Authentication ────────────────────────────────────────────────────────────

/// Authentication frame body.
///
/// `elements` holds everything after the challenge text: FT elements for
/// algorithm 2, or the SAE commit/confirm payload for algorithm 3 (SAE
/// payloads are not IE-formatted, so they are kept verbatim).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authentication {
    pub algorithm: AuthAlgorithm,
    pub transaction_seq: u16,
    pub status: StatusCode,
    pub challenge: Option<Vec<u8>>,
    pub elements: Vec<u8>,
}

impl Authentication {
    pub fn new(algorithm: AuthAlgorithm, transaction_seq: u16, status: StatusCode) -> Self {
        Self {
            algorithm,
            transaction_seq,
            status,
            challenge: None,
            elements: Vec::new(),
        }
    }
}

// ── (Re)Association ───────────────────────────────────────────────────────────

/// (Re)Association Request body.  `current_ap` is present only for
/// reassociation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssocRequest {
    pub capability: CapabilityInfo,
    pub listen_interval: u16,
    pub current_ap: Option<MacAddr>,
    pub ssid: Vec<u8>,
    pub rates: Vec<u8>,
    pub ht_cap: Option<HtCapabilities>,
    pub vht_cap: Option<VhtCapabilities>,
    pub he_cap: Option<HeCapabilities>,
    pub rsn: Option<Vec<u8>>,
    pub wpa: Option<Vec<u8>>,
    pub mde: Option<MobilityDomain>,
    pub fte: Option<Vec<u8>>,
    pub ext_cap: Option<Vec<u8>>,
    pub vendor: Vec<VendorIe>,
}

/// (Re)Association Response body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AssocResponse {
    pub capability: CapabilityInfo,
    pub status: StatusCode,
    pub aid: u16,
    pub rates: Vec<u8>,
    pub ht_cap: Option<HtCapabilities>,
    pub ht_op: Option<HtOperation>,
    pub vht_cap: Option<VhtCapabilities>,
    pub he_cap: Option<HeCapabilities>,
    pub erp: Option<ErpInfo>,
    pub mde: Option<MobilityDomain>,
    pub fte: Option<Vec<u8>>,
    pub vendor: Vec<VendorIe>,
}

// ── Probe / Beacon ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProbeRequest {
    /// Empty SSID is the wildcard.
    pub ssid: Vec<u8>,
    pub rates: Vec<u8>,
    pub ht_cap: Option<HtCapabilities>,
    pub vht_cap: Option<VhtCapabilities>,
    pub he_cap: Option<HeCapabilities>,
    pub vendor: Vec<VendorIe>,
}

/// Body shared by Beacon and Probe Response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BeaconBody {
    pub timestamp: u64,
    pub beacon_interval: u16,
    pub capability: CapabilityInfo,
    pub ssid: Vec<u8>,
    pub rates: Vec<u8>,
    pub channel: Option<u8>,
    pub erp: Option<ErpInfo>,
    pub ht_cap: Option<HtCapabilities>,
    pub ht_op: Option<HtOperation>,
    pub vht_cap: Option<VhtCapabilities>,
    pub he_cap: Option<HeCapabilities>,
    pub rsn: Option<Vec<u8>>,
    pub wpa: Option<Vec<u8>>,
    pub mde: Option<MobilityDomain>,
    pub vendor: Vec<VendorIe>,
}

// ── Deauthentication / Disassociation ─────────────────────────────────────────

/// Body of both Deauthentication and Disassociation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnect {
    pub reason: ReasonCode,
    pub vendor: Vec<VendorIe>,
}

impl Disconnect {
    pub fn new(reason: ReasonCode) -> Self {
        Self {
            reason,
            vendor: Vec::new(),
        }
    }
}

// ── Action ────────────────────────────────────────────────────────────────────

/// Action frame categories.
pub mod category {
    pub const SPECTRUM_MGMT: u8 = 0;
    pub const QOS: u8 = 1;
    pub const BLOCK_ACK: u8 = 3;
    pub const PUBLIC: u8 = 4;
    pub const RADIO_MEASUREMENT: u8 = 5;
    pub const SA_QUERY: u8 = 8;
    pub const ROBUST_AV_STREAMING: u8 = 19;
}

/// Action frames the MLME builds or reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFrame {
    /// QoS ADDTS request; `tspec` is the raw TSPEC element body.
    AddtsRequest { dialog_token: u8, tspec: Vec<u8> },
    AddtsResponse {
        dialog_token: u8,
        status: StatusCode,
        tspec: Vec<u8>,
    },
    Delts { ts_info: [u8; 3], reason: ReasonCode },
    /// Spectrum-management channel switch announcement.
    ChannelSwitch(ChannelSwitchAnnouncement),
    /// Public extended channel switch announcement.
    ExtChannelSwitch(ExtChannelSwitchAnnouncement),
    /// Radio measurement report; `elements` are Measurement Report elements.
    RadioMeasurementReport { dialog_token: u8, elements: Vec<u8> },
    LinkMeasurementReport {
        dialog_token: u8,
        tx_power: i8,
        link_margin: i8,
        rx_antenna: u8,
        tx_antenna: u8,
        rcpi: u8,
        rsni: u8,
    },
    NeighborReportRequest { dialog_token: u8, ssid: Option<Vec<u8>> },
    NeighborReportResponse { dialog_token: u8, elements: Vec<u8> },
    SaQueryRequest { transaction_id: u16 },
    SaQueryResponse { transaction_id: u16 },
    AddbaRequest {
        dialog_token: u8,
        parameters: u16,
        timeout: u16,
        starting_sequence: u16,
    },
    AddbaResponse {
        dialog_token: u8,
        status: StatusCode,
        parameters: u16,
        timeout: u16,
    },
    Delba { parameters: u16, reason: ReasonCode },
    MscsRequest { dialog_token: u8, descriptor: Vec<u8> },
    MscsResponse {
        dialog_token: u8,
        status: StatusCode,
        descriptor: Vec<u8>,
    },
    /// Anything else, kept verbatim.
    Other { category: u8, action: u8, body: Vec<u8> },
}

impl ActionFrame {
    /// The (category, action) pair for this frame.
    pub fn code(&self) -> (u8, u8) {
        match self {
            ActionFrame::AddtsRequest { .. } => (category::QOS, 0),
            ActionFrame::AddtsResponse { .. } => (category::QOS, 1),
            ActionFrame::Delts { .. } => (category::QOS, 2),
            ActionFrame::ChannelSwitch(_) => (category::SPECTRUM_MGMT, 4),
            ActionFrame::ExtChannelSwitch(_) => (category::PUBLIC, 4),
            ActionFrame::RadioMeasurementReport { .. } => (category::RADIO_MEASUREMENT, 1),
            ActionFrame::LinkMeasurementReport { .. } => (category::RADIO_MEASUREMENT, 3),
            ActionFrame::NeighborReportRequest { .. } => (category::RADIO_MEASUREMENT, 4),
            ActionFrame::NeighborReportResponse { .. } => (category::RADIO_MEASUREMENT, 5),
            ActionFrame::SaQueryRequest { .. } => (category::SA_QUERY, 0),
            ActionFrame::SaQueryResponse { .. } => (category::SA_QUERY, 1),
            ActionFrame::AddbaRequest { .. } => (category::BLOCK_ACK, 0),
            ActionFrame::AddbaResponse { .. } => (category::BLOCK_ACK, 1),
            ActionFrame::Delba { .. } => (category::BLOCK_ACK, 2),
            ActionFrame::MscsRequest { .. } => (category::ROBUST_AV_STREAMING, 4),
            ActionFrame::MscsResponse { .. } => (category::ROBUST_AV_STREAMING, 5),
            ActionFrame::Other { category, action, .. } => (*category, *action),
        }
    }

    /// Robust action frames must be protected once PMF is negotiated.
    pub fn is_robust(&self) -> bool {
        let (category, _) = self.code();
        category != category::PUBLIC
    }
}

// ── Whole frames ──────────────────────────────────────────────────────────────

/// Body of a management frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MgmtBody {
    AssocRequest(AssocRequest),
    AssocResponse(AssocResponse),
    ReassocRequest(AssocRequest),
    ReassocResponse(AssocResponse),
    ProbeRequest(ProbeRequest),
    ProbeResponse(BeaconBody),
    Beacon(BeaconBody),
    Authentication(Authentication),
    Deauthentication(Disconnect),
    Disassociation(Disconnect),
    Action(ActionFrame),
    /// A protected body that has not been decrypted yet.  Carries the
    /// subtype from the header so it can be decoded after decryption.
    Encrypted { subtype: MgmtSubtype, bytes: Vec<u8> },
}

impl MgmtBody {
    pub fn subtype(&self) -> MgmtSubtype {
        match self {
            MgmtBody::AssocRequest(_) => MgmtSubtype::AssocRequest,
            MgmtBody::AssocResponse(_) => MgmtSubtype::AssocResponse,
            MgmtBody::ReassocRequest(_) => MgmtSubtype::ReassocRequest,
            MgmtBody::ReassocResponse(_) => MgmtSubtype::ReassocResponse,
            MgmtBody::ProbeRequest(_) => MgmtSubtype::ProbeRequest,
            MgmtBody::ProbeResponse(_) => MgmtSubtype::ProbeResponse,
            MgmtBody::Beacon(_) => MgmtSubtype::Beacon,
            MgmtBody::Authentication(_) => MgmtSubtype::Authentication,
            MgmtBody::Deauthentication(_) => MgmtSubtype::Deauthentication,
            MgmtBody::Disassociation(_) => MgmtSubtype::Disassociation,
            MgmtBody::Action(_) => MgmtSubtype::Action,
            MgmtBody::Encrypted { subtype, .. } => *subtype,
        }
    }
}

/// A complete management frame: header plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtFrame {
    pub header: MgmtHeader,
    pub body: MgmtBody,
}

impl MgmtFrame {
    /// Builds a frame whose header subtype matches `body`.
    pub fn new(da: MacAddr, sa: MacAddr, bssid: MacAddr, body: MgmtBody) -> Self {
        Self {
            header: MgmtHeader::new(body.subtype(), da, sa, bssid),
            body,
        }
    }
}
