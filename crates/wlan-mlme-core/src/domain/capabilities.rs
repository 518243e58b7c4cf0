//! Capability sets and their intersection.
//!
//! When two parties associate, each advertises what it can do (rates, HT,
//! VHT, HE).  The link can only use what *both* support, so the MLME
//! computes an intersection and stores it as the negotiated set.
//!
//! Intersecting a set with itself returns the same set; the association
//! request builder relies on that when the peer's capabilities are unknown.

use crate::protocol::frames::{AssocRequest, AssocResponse, BeaconBody, CapabilityInfo};
use crate::protocol::ie::{self, HeCapabilities, HtCapabilities, VhtCapabilities};

/// Frequency band a channel belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Band {
    TwoGhz,
    FiveGhz,
    SixGhz,
}

impl Band {
    /// Classifies a 2.4/5 GHz channel number.  6 GHz channel numbers overlap
    /// with 2.4 GHz ones, so 6 GHz must be chosen explicitly.
    pub fn from_channel(channel: u8) -> Self {
        if (1..=14).contains(&channel) {
            Band::TwoGhz
        } else {
            Band::FiveGhz
        }
    }
}

/// Rates and PHY capabilities advertised by one party.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub capability: CapabilityInfo,
    pub rates: Vec<u8>,
    pub ht: Option<HtCapabilities>,
    pub vht: Option<VhtCapabilities>,
    pub he: Option<HeCapabilities>,
}

impl CapabilitySet {
    pub fn is_ht(&self) -> bool {
        self.ht.is_some()
    }

    pub fn is_vht(&self) -> bool {
        self.vht.is_some()
    }

    pub fn is_he(&self) -> bool {
        self.he.is_some()
    }

    pub fn qos(&self) -> bool {
        self.capability.has(CapabilityInfo::QOS)
    }

    pub fn from_assoc_request(req: &AssocRequest) -> Self {
        Self {
            capability: req.capability,
            rates: req.rates.clone(),
            ht: req.ht_cap,
            vht: req.vht_cap,
            he: req.he_cap.clone(),
        }
    }

    pub fn from_assoc_response(resp: &AssocResponse) -> Self {
        Self {
            capability: resp.capability,
            rates: resp.rates.clone(),
            ht: resp.ht_cap,
            vht: resp.vht_cap,
            he: resp.he_cap.clone(),
        }
    }

    pub fn from_beacon(beacon: &BeaconBody) -> Self {
        Self {
            capability: beacon.capability,
            rates: beacon.rates.clone(),
            ht: beacon.ht_cap,
            vht: beacon.vht_cap,
            he: beacon.he_cap.clone(),
        }
    }

    /// Returns what both `self` and `peer` support.
    ///
    /// Fields that only make sense from our side (basic-rate flags,
    /// beamforming and antenna selection details, PPE thresholds) are taken
    /// from `self`.  VHT survives only alongside HT.
    pub fn intersect(&self, peer: &CapabilitySet) -> CapabilitySet {
        let ht = match (&self.ht, &peer.ht) {
            (Some(a), Some(b)) => Some(intersect_ht(a, b)),
            _ => None,
        };
        let vht = match (&self.vht, &peer.vht, ht.is_some()) {
            (Some(a), Some(b), true) => Some(intersect_vht(a, b)),
            _ => None,
        };
        let he = match (&self.he, &peer.he) {
            (Some(a), Some(b)) => Some(intersect_he(a, b)),
            _ => None,
        };
        CapabilitySet {
            capability: CapabilityInfo(self.capability.0 & peer.capability.0),
            rates: intersect_rates(&self.rates, &peer.rates),
            ht,
            vht,
            he,
        }
    }

    /// True when `peer` supports every rate we mark as basic.
    pub fn basic_rates_supported_by(&self, peer_rates: &[u8]) -> bool {
        self.rates
            .iter()
            .filter(|r| *r & ie::BASIC_RATE != 0)
            .all(|basic| {
                peer_rates
                    .iter()
                    .any(|p| ie::rate_value(*p) == ie::rate_value(*basic))
            })
    }
}

/// Keeps our rates (with our basic flags) that the peer also lists.
pub fn intersect_rates(ours: &[u8], theirs: &[u8]) -> Vec<u8> {
    ours.iter()
        .copied()
        .filter(|r| theirs.iter().any(|t| ie::rate_value(*t) == ie::rate_value(*r)))
        .collect()
}

const HT_SHARED_CAP_BITS: u16 = HtCapabilities::LDPC
    | HtCapabilities::CHAN_WIDTH_40
    | HtCapabilities::GREENFIELD
    | HtCapabilities::SHORT_GI_20
    | HtCapabilities::SHORT_GI_40
    | HtCapabilities::DSSS_CCK_40
    | HtCapabilities::LSIG_TXOP_PROTECTION;

fn intersect_ht(a: &HtCapabilities, b: &HtCapabilities) -> HtCapabilities {
    let mut out = *a;
    out.cap_info = (a.cap_info & !HT_SHARED_CAP_BITS) | (a.cap_info & b.cap_info & HT_SHARED_CAP_BITS);
    // Max A-MPDU length exponent: smaller wins.  Min MPDU spacing: larger wins.
    let max_len = (a.ampdu_params & 0x03).min(b.ampdu_params & 0x03);
    let spacing = ((a.ampdu_params >> 2) & 0x07).max((b.ampdu_params >> 2) & 0x07);
    out.ampdu_params = (a.ampdu_params & 0xe0) | (spacing << 2) | max_len;
    // Rx MCS bitmask occupies the first ten bytes of the MCS set.
    for i in 0..10 {
        out.mcs_set[i] = a.mcs_set[i] & b.mcs_set[i];
    }
    out
}

fn intersect_vht(a: &VhtCapabilities, b: &VhtCapabilities) -> VhtCapabilities {
    VhtCapabilities {
        info: a.info & b.info,
        rx_mcs_map: intersect_mcs_map(a.rx_mcs_map, b.rx_mcs_map),
        rx_highest_rate: a.rx_highest_rate.min(b.rx_highest_rate),
        tx_mcs_map: intersect_mcs_map(a.tx_mcs_map, b.tx_mcs_map),
        tx_highest_rate: a.tx_highest_rate.min(b.tx_highest_rate),
    }
}

fn intersect_he(a: &HeCapabilities, b: &HeCapabilities) -> HeCapabilities {
    let mut mac_info = a.mac_info;
    for (out, theirs) in mac_info.iter_mut().zip(b.mac_info.iter()) {
        *out &= *theirs;
    }
    let mut phy_info = a.phy_info;
    for (out, theirs) in phy_info.iter_mut().zip(b.phy_info.iter()) {
        *out &= *theirs;
    }
    // The MCS/NSS block shrinks with the shared channel widths; each 16-bit
    // map keeps the weaker support per spatial stream.
    let mcs_len = HeCapabilities::mcs_nss_len(&phy_info);
    let mut mcs_nss = Vec::with_capacity(mcs_len);
    for i in (0..mcs_len).step_by(2) {
        let ours = read_map(&a.mcs_nss, i);
        let theirs = read_map(&b.mcs_nss, i);
        mcs_nss.extend_from_slice(&intersect_mcs_map(ours, theirs).to_le_bytes());
    }
    HeCapabilities {
        mac_info,
        phy_info,
        mcs_nss,
        ppe_thresholds: a.ppe_thresholds.clone(),
    }
}

fn read_map(bytes: &[u8], at: usize) -> u16 {
    match (bytes.get(at), bytes.get(at + 1)) {
        (Some(lo), Some(hi)) => u16::from_le_bytes([*lo, *hi]),
        _ => 0xffff,
    }
}

/// Per-stream minimum of two 2-bit-per-stream MCS maps, where 3 means
/// "not supported" and dominates.
fn intersect_mcs_map(a: u16, b: u16) -> u16 {
    let mut out = 0u16;
    for nss in 0..8 {
        let shift = nss * 2;
        let x = (a >> shift) & 0x3;
        let y = (b >> shift) & 0x3;
        let v = if x == 3 || y == 3 { 3 } else { x.min(y) };
        out |= v << shift;
    }
    out
}
