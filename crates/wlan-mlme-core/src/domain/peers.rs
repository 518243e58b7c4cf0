//! Per-session table of associated peers.
//!
//! An AP session holds one entry per associated station; a station session
//! holds a single entry for the AP it is associated with.  Entries are
//! created on association acceptance and destroyed on link teardown.
//!
//! Association IDs (AIDs) are allocated from `1..=max_peers`, lowest free
//! first, so a departing station's AID is reused by the next arrival.

use thiserror::Error;

use crate::domain::capabilities::{Band, CapabilitySet};
use crate::protocol::frames::AuthAlgorithm;
use crate::protocol::ie;
use crate::protocol::mac::MacAddr;

/// Largest AID 802.11 allows.
pub const MAX_AID: u16 = 2007;

/// Errors returned by [`PeerTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeerError {
    #[error("peer table full ({max} peers)")]
    TableFull { max: usize },

    #[error("peer {0} is already associated")]
    Duplicate(MacAddr),
}

/// Which legacy-coexistence categories a peer falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LegacyClass {
    /// 802.11b-only station on 2.4 GHz.
    pub non_erp: bool,
    /// No HT capabilities.
    pub non_ht: bool,
    /// HT, but cannot use 40 MHz.
    pub ht20_only: bool,
    /// HT without greenfield support.
    pub non_greenfield: bool,
    /// HT without L-SIG TXOP protection support.
    pub no_lsig_txop: bool,
}

impl LegacyClass {
    /// Classifies a peer from its (negotiated) capabilities.
    pub fn classify(caps: &CapabilitySet, band: Band) -> Self {
        match &caps.ht {
            None => LegacyClass {
                non_erp: band == Band::TwoGhz && ie::is_dsss_only(&caps.rates),
                non_ht: true,
                ..Default::default()
            },
            Some(ht) => LegacyClass {
                non_erp: false,
                non_ht: false,
                ht20_only: !ht.supports_40mhz(),
                non_greenfield: !ht.greenfield(),
                no_lsig_txop: !ht.lsig_txop_protection(),
            },
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.non_erp || self.non_ht
    }
}

/// Protected-management-frame state for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PmfState {
    pub enabled: bool,
    pub sa_query_in_progress: bool,
    pub sa_query_transaction: u16,
    pub sa_query_retries: u8,
}

/// Transmit statistics kept per peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerCounters {
    pub tx_acked: u32,
    pub tx_not_acked: u32,
    pub tx_retries: u32,
}

/// One associated peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    pub aid: u16,
    pub mac: MacAddr,
    /// Negotiated subset: intersection of our and the peer's capabilities.
    pub caps: CapabilitySet,
    pub legacy: LegacyClass,
    pub qos: bool,
    pub pmf: PmfState,
    pub listen_interval: u16,
    pub rsn: Option<Vec<u8>>,
    pub auth_algorithm: AuthAlgorithm,
    pub counters: PeerCounters,
}

/// Bounded table of peers owned by one session.
#[derive(Debug, Clone, Default)]
pub struct PeerTable {
    peers: Vec<Peer>,
    max_peers: usize,
}

impl PeerTable {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: Vec::new(),
            max_peers: max_peers.min(MAX_AID as usize),
        }
    }

    /// Admits a new peer with the lowest free AID.
    ///
    /// # Errors
    ///
    /// [`PeerError::Duplicate`] if `mac` is already present,
    /// [`PeerError::TableFull`] if the table is at capacity.
    pub fn admit(&mut self, mac: MacAddr, caps: CapabilitySet, band: Band) -> Result<&mut Peer, PeerError> {
        if self.get(&mac).is_some() {
            return Err(PeerError::Duplicate(mac));
        }
        let aid = self.free_aid().ok_or(PeerError::TableFull { max: self.max_peers })?;
        let legacy = LegacyClass::classify(&caps, band);
        let qos = caps.qos();
        self.peers.push(Peer {
            aid,
            mac,
            caps,
            legacy,
            qos,
            pmf: PmfState::default(),
            listen_interval: 0,
            rsn: None,
            auth_algorithm: AuthAlgorithm::OpenSystem,
            counters: PeerCounters::default(),
        });
        let last = self.peers.len() - 1;
        Ok(&mut self.peers[last])
    }

    fn free_aid(&self) -> Option<u16> {
        if self.peers.len() >= self.max_peers {
            return None;
        }
        (1..=self.max_peers as u16).find(|aid| !self.peers.iter().any(|p| p.aid == *aid))
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&Peer> {
        self.peers.iter().find(|p| p.mac == *mac)
    }

    pub fn get_mut(&mut self, mac: &MacAddr) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.mac == *mac)
    }

    pub fn by_aid(&self, aid: u16) -> Option<&Peer> {
        self.peers.iter().find(|p| p.aid == aid)
    }

    pub fn remove(&mut self, mac: &MacAddr) -> Option<Peer> {
        let idx = self.peers.iter().position(|p| p.mac == *mac)?;
        Some(self.peers.swap_remove(idx))
    }

    /// Removes every peer, returning them for per-peer cleanup.
    pub fn drain(&mut self) -> Vec<Peer> {
        std::mem::take(&mut self.peers)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.len() >= self.max_peers
    }

    pub fn capacity(&self) -> usize {
        self.max_peers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ie::HtCapabilities;

    fn mac(last: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, last])
    }

    fn legacy_b() -> CapabilitySet {
        CapabilitySet {
            rates: vec![0x82, 0x84, 0x8b, 0x96],
            ..Default::default()
        }
    }

    #[test]
    fn test_admit_allocates_lowest_free_aid() {
        // Arrange
        let mut table = PeerTable::new(4);
        table.admit(mac(1), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        table.admit(mac(2), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        table.remove(&mac(1));

        // Act
        let aid = table.admit(mac(3), CapabilitySet::default(), Band::FiveGhz).expect("admit").aid;

        // Assert
        assert_eq!(aid, 1, "AID 1 was freed and must be reused");
    }

    #[test]
    fn test_admit_rejects_when_full() {
        let mut table = PeerTable::new(1);
        table.admit(mac(1), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        assert_eq!(
            table.admit(mac(2), CapabilitySet::default(), Band::FiveGhz).unwrap_err(),
            PeerError::TableFull { max: 1 }
        );
        assert!(table.is_full());
    }

    #[test]
    fn test_admit_rejects_duplicates() {
        let mut table = PeerTable::new(4);
        table.admit(mac(1), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        assert_eq!(
            table.admit(mac(1), CapabilitySet::default(), Band::FiveGhz).unwrap_err(),
            PeerError::Duplicate(mac(1))
        );
    }

    #[test]
    fn test_classify_11b_station_on_2ghz() {
        let class = LegacyClass::classify(&legacy_b(), Band::TwoGhz);
        assert!(class.non_erp);
        assert!(class.non_ht);
        assert!(class.is_legacy());
    }

    #[test]
    fn test_classify_dsss_rates_on_5ghz_is_not_non_erp() {
        let class = LegacyClass::classify(&legacy_b(), Band::FiveGhz);
        assert!(!class.non_erp);
        assert!(class.non_ht);
    }

    #[test]
    fn test_classify_ht20_non_greenfield_station() {
        // Arrange
        let caps = CapabilitySet {
            rates: vec![0x0c],
            ht: Some(HtCapabilities::default()),
            ..Default::default()
        };

        // Act
        let class = LegacyClass::classify(&caps, Band::FiveGhz);

        // Assert
        assert!(!class.non_ht);
        assert!(class.ht20_only);
        assert!(class.non_greenfield);
        assert!(class.no_lsig_txop);
    }

    #[test]
    fn test_drain_empties_table() {
        let mut table = PeerTable::new(4);
        table.admit(mac(1), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        table.admit(mac(2), CapabilitySet::default(), Band::FiveGhz).expect("admit");
        let drained = table.drain();
        assert_eq!(drained.len(), 2);
        assert!(table.is_empty());
    }
}
