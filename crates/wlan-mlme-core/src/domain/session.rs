//! One [`Session`] per BSS this interface takes part in.
//!
//! # What is in a session? (for beginners)
//!
//! A station that joins an AP, and an AP that runs a BSS, both need to
//! remember the same kinds of things: the BSSID, the channel, which step of
//! the join/auth/assoc dance we are in, who the peers are, and what both
//! sides can do.  The session bundles all of that so the engine can look it
//! up by BSSID, virtual device, peer MAC, scan id, or session id.
//!
//! Sessions are stored in a [`SessionTable`](crate::SessionTable) slot map.
//! A slot freed by one BSS can be reused by another straight away, so code
//! that must remember a session across an asynchronous boundary (a timer, a
//! transmit completion, a scan) keeps a [`SessionRef`] and revalidates it
//! on the way back in.

use std::fmt;

use crate::domain::capabilities::{Band, CapabilitySet};
use crate::domain::peers::PeerTable;
use crate::domain::preauth::PreAuthRegistry;
use crate::domain::protection::{ProtectionConfig, ProtectionEngine};
use crate::domain::state::{MlmState, SmeState, StateMachine, TimerId};
use crate::protocol::frames::AuthAlgorithm;
use crate::protocol::ie::{MobilityDomain, VendorIe};
use crate::protocol::mac::MacAddr;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Monotonically increasing session id.  Never reused while the process
/// runs, unlike slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A revalidatable handle: slot index plus the id the slot held when the
/// handle was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionRef {
    pub slot: usize,
    pub id: SessionId,
}

impl fmt::Display for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.slot)
    }
}

/// Operating mode of the virtual device owning the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Ap,
    Sta,
    P2pGo,
    P2pClient,
    Ndi,
    Monitor,
}

impl Role {
    /// Roles that run a BSS and answer authentication/association.
    pub fn is_ap_like(self) -> bool {
        matches!(self, Role::Ap | Role::P2pGo)
    }

    /// Roles that join somebody else's BSS.
    pub fn is_sta_like(self) -> bool {
        matches!(self, Role::Sta | Role::P2pClient)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BssType {
    #[default]
    Infrastructure,
    Independent,
    Ndi,
}

// ── Owned sub-state ───────────────────────────────────────────────────────────

/// Keys and security elements for the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityMaterial {
    pub privacy: bool,
    pub rsn_ie: Option<Vec<u8>>,
    pub wpa_ie: Option<Vec<u8>>,
    /// Static WEP keys for shared-key authentication.
    pub wep_keys: [Option<Vec<u8>>; 4],
    pub default_key_id: u8,
    pub pmf_capable: bool,
    pub pmf_required: bool,
}

impl SecurityMaterial {
    pub fn wep_key(&self, key_id: u8) -> Option<&[u8]> {
        self.wep_keys.get(key_id as usize)?.as_deref()
    }

    pub fn default_wep_key(&self) -> Option<&[u8]> {
        self.wep_key(self.default_key_id)
    }
}

/// A fast-transition pre-authentication the SME asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtPreauthRequest {
    pub target_bssid: MacAddr,
    pub target_channel: u8,
    pub mde: Option<MobilityDomain>,
    /// FT elements (FTE, RSN with PMKR0Name) for Authentication frame 1.
    pub ft_ies: Vec<u8>,
}

/// 802.11r context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FtContext {
    pub preauth_req: Option<FtPreauthRequest>,
    /// Elements the target AP returned in Authentication frame 2.
    pub saved_rsp_ies: Option<Vec<u8>>,
    /// This session started the pre-authentication (it is the current AP).
    pub originated_here: bool,
    /// The session this context was copied from, on a target session.
    pub origin: Option<SessionRef>,
    /// Authentication frame 1 already went out for `preauth_req`.
    pub auth_sent: bool,
}

impl FtContext {
    pub fn is_pending(&self) -> bool {
        self.preauth_req.is_some()
    }

    pub fn clear(&mut self) {
        *self = FtContext::default();
    }
}

/// Station-side authentication in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaAuthContext {
    pub algorithm: AuthAlgorithm,
    /// Challenge received in frame 2 (shared key).
    pub challenge: Option<Vec<u8>>,
}

/// Transmit classes whose failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryClass {
    Auth,
    SaeAuth,
    Reassoc,
    FtReassoc,
    Deauth,
}

impl RetryClass {
    const COUNT: usize = 5;

    fn index(self) -> usize {
        self as usize
    }
}

/// Bounded per-class retry counters for timer-driven resends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryCounters([u8; RetryClass::COUNT]);

impl RetryCounters {
    pub fn get(&self, class: RetryClass) -> u8 {
        self.0[class.index()]
    }

    /// Consumes one retry if fewer than `limit` were used.  Returns whether
    /// a retry may be attempted.
    pub fn try_consume(&mut self, class: RetryClass, limit: u8) -> bool {
        let used = &mut self.0[class.index()];
        if *used >= limit {
            return false;
        }
        *used += 1;
        true
    }

    pub fn reset(&mut self, class: RetryClass) {
        self.0[class.index()] = 0;
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Parameters for [`SessionTable::create`](crate::SessionTable::create).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    pub bssid: MacAddr,
    pub self_mac: MacAddr,
    pub vdev_id: u8,
    pub role: Role,
    pub bss_type: BssType,
    pub max_peers: usize,
    pub channel: u8,
    pub preauth_capacity: usize,
    pub open_auth_timeout: u32,
    pub protection_cache_size: usize,
}

impl SessionParams {
    pub fn new(bssid: MacAddr, self_mac: MacAddr, role: Role) -> Self {
        Self {
            bssid,
            self_mac,
            vdev_id: 0,
            role,
            bss_type: BssType::Infrastructure,
            max_peers: 1,
            channel: 1,
            preauth_capacity: 16,
            open_auth_timeout: 5_000,
            protection_cache_size: 16,
        }
    }
}

/// Per-BSS MLME state.
#[derive(Debug, Clone)]
pub struct Session {
    pub sref: SessionRef,
    pub vdev_id: u8,
    pub bssid: MacAddr,
    pub self_mac: MacAddr,
    pub role: Role,
    pub bss_type: BssType,

    pub mlm: StateMachine<MlmState>,
    pub sme: StateMachine<SmeState>,

    pub channel: u8,
    pub ch_width_40: bool,
    pub beacon_interval: u16,
    pub listen_interval: u16,
    pub ssid: Vec<u8>,

    /// What we advertise.
    pub self_caps: CapabilitySet,
    /// What the AP advertised (station role).
    pub bss_caps: Option<CapabilitySet>,
    /// Intersection of `self_caps` and `bss_caps` after association.
    pub negotiated: Option<CapabilitySet>,
    /// AID the AP assigned us (station role).
    pub aid: u16,

    pub protection: ProtectionEngine,
    pub ft: FtContext,
    pub peers: PeerTable,
    pub preauth: PreAuthRegistry,
    pub security: SecurityMaterial,

    pub sta_auth: Option<StaAuthContext>,
    /// Retries spent on exchanges that are resent when the response timer
    /// expires.  Link-layer resends are counted per frame instead.
    pub retries: RetryCounters,
    pub scan_id: Option<u32>,
    /// Vendor elements appended to the next Deauthentication/Disassociation.
    pub disconnect_vendor_ies: Vec<VendorIe>,
    /// P2P notice-of-absence attribute advertised by a group owner.  Dropped
    /// from frames it does not fit into.
    pub p2p_noa: Option<VendorIe>,

    wep_iv: u32,
    valid: bool,
}

impl Session {
    pub fn new(sref: SessionRef, params: &SessionParams) -> Self {
        let band = Band::from_channel(params.channel);
        let protection = ProtectionEngine::new(ProtectionConfig {
            cache_size: params.protection_cache_size,
            band,
            ..ProtectionConfig::default()
        });
        Self {
            sref,
            vdev_id: params.vdev_id,
            bssid: params.bssid,
            self_mac: params.self_mac,
            role: params.role,
            bss_type: params.bss_type,
            mlm: StateMachine::new(MlmState::Idle),
            sme: StateMachine::new(SmeState::Idle),
            channel: params.channel,
            ch_width_40: false,
            beacon_interval: 100,
            listen_interval: 1,
            ssid: Vec::new(),
            self_caps: CapabilitySet::default(),
            bss_caps: None,
            negotiated: None,
            aid: 0,
            protection,
            ft: FtContext::default(),
            peers: PeerTable::new(params.max_peers),
            preauth: PreAuthRegistry::new(params.preauth_capacity, params.open_auth_timeout),
            security: SecurityMaterial::default(),
            sta_auth: None,
            retries: RetryCounters::default(),
            scan_id: None,
            disconnect_vendor_ies: Vec::new(),
            p2p_noa: None,
            wep_iv: 0,
            valid: true,
        }
    }

    pub fn id(&self) -> SessionId {
        self.sref.id
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn mlm_state(&self) -> MlmState {
        self.mlm.current()
    }

    pub fn sme_state(&self) -> SmeState {
        self.sme.current()
    }

    pub fn band(&self) -> Band {
        Band::from_channel(self.channel)
    }

    pub fn is_ap(&self) -> bool {
        self.role.is_ap_like()
    }

    pub fn is_sta(&self) -> bool {
        self.role.is_sta_like()
    }

    /// Rebuilds the protection engine for the BSS parameters an AP is about
    /// to start with.  Clears every protection cache.
    pub fn configure_protection(&mut self, cache_size: usize, rifs_permitted: bool) {
        self.protection = ProtectionEngine::new(ProtectionConfig {
            cache_size,
            band: self.band(),
            ht_enabled: self.self_caps.is_ht(),
            bss_40mhz: self.ch_width_40,
            rifs_permitted,
        });
    }

    /// IV for the next WEP-encrypted frame.
    pub fn next_wep_iv(&mut self) -> u32 {
        let iv = self.wep_iv;
        self.wep_iv = self.wep_iv.wrapping_add(1) & 0x00ff_ffff;
        iv
    }

    /// Frees every owned sub-table and marks the session invalid.  Returns
    /// the pre-auth timers the caller must cancel.
    pub fn release(&mut self) -> Vec<TimerId> {
        for peer in self.peers.drain() {
            self.protection.on_peer_removed(&peer.mac);
        }
        self.preauth.clear();
        self.ft.clear();
        self.sta_auth = None;
        self.disconnect_vendor_ies.clear();
        self.valid = false;
        self.preauth.take_released_timers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::preauth::PreAuthNode;

    fn session(role: Role) -> Session {
        let params = SessionParams {
            max_peers: 4,
            ..SessionParams::new(MacAddr([0x02, 0, 0, 0, 0, 1]), MacAddr([0x02, 0, 0, 0, 0, 9]), role)
        };
        Session::new(
            SessionRef {
                slot: 0,
                id: SessionId(1),
            },
            &params,
        )
    }

    #[test]
    fn test_new_session_starts_idle_and_valid() {
        let s = session(Role::Sta);
        assert_eq!(s.mlm_state(), MlmState::Idle);
        assert_eq!(s.sme_state(), SmeState::Idle);
        assert!(s.is_valid());
        assert!(s.is_sta());
        assert!(!s.is_ap());
    }

    #[test]
    fn test_retry_counter_is_bounded() {
        let mut counters = RetryCounters::default();
        assert!(counters.try_consume(RetryClass::Auth, 2));
        assert!(counters.try_consume(RetryClass::Auth, 2));
        assert!(!counters.try_consume(RetryClass::Auth, 2));
        assert_eq!(counters.get(RetryClass::Auth), 2);
        assert_eq!(counters.get(RetryClass::Reassoc), 0, "classes are independent");
        counters.reset(RetryClass::Auth);
        assert_eq!(counters.get(RetryClass::Auth), 0);
    }

    #[test]
    fn test_wep_iv_wraps_at_24_bits() {
        let mut s = session(Role::Sta);
        s.wep_iv = 0x00ff_ffff;
        assert_eq!(s.next_wep_iv(), 0x00ff_ffff);
        assert_eq!(s.next_wep_iv(), 0);
    }

    #[test]
    fn test_release_clears_owned_tables() {
        // Arrange
        let mut s = session(Role::Ap);
        s.peers
            .admit(MacAddr([0x02, 0, 0, 0, 0, 5]), CapabilitySet::default(), Band::TwoGhz)
            .expect("admit");
        let mut node = PreAuthNode::new(
            MacAddr([0x02, 0, 0, 0, 0, 6]),
            AuthAlgorithm::SharedKey,
            MlmState::WaitAuthFrame3,
            0,
        );
        node.timer = Some(TimerId(3));
        s.preauth.add(node).expect("add");
        s.ft.originated_here = true;

        // Act
        let timers = s.release();

        // Assert
        assert!(!s.is_valid());
        assert!(s.peers.is_empty());
        assert!(s.preauth.is_empty());
        assert!(!s.ft.originated_here);
        assert_eq!(timers, vec![TimerId(3)]);
    }

    #[test]
    fn test_wep_key_lookup() {
        let mut s = session(Role::Sta);
        s.security.wep_keys[2] = Some(vec![1, 2, 3, 4, 5]);
        s.security.default_key_id = 2;
        assert_eq!(s.security.default_wep_key(), Some(&[1u8, 2, 3, 4, 5][..]));
        assert_eq!(s.security.wep_key(0), None);
        assert_eq!(s.security.wep_key(7), None);
    }
}
