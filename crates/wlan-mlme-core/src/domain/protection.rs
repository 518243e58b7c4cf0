//! Legacy-coexistence protection for AP sessions.
//!
//! # What is "protection"? (for beginners)
//!
//! Older stations cannot decode newer modulations.  If an 802.11b station is
//! associated (or merely transmitting nearby), OFDM and HT transmissions must
//! be preceded by something it *can* understand, usually RTS/CTS or
//! CTS-to-self, so it defers.  The AP announces this need in its beacons:
//! the ERP element for 11b, and the HT Operation element's protection mode
//! and flags for everything HT-related.
//!
//! The engine tracks each category on two independent tracks:
//!
//! - **own BSS** – our associated peers.  Protection persists until the last
//!   offending peer leaves.
//! - **overlap** – neighbouring BSSs heard on our channel.  These caches are
//!   reset periodically by a decay timer, so protection relaxes once the
//!   neighbour is no longer heard.
//!
//! Each track is a bounded cache of offending MAC addresses plus a counter.
//! A 0→1 counter transition turns the advertised bit on and records a
//! beacon change; 1→0 turns it off again.  Nothing here ever fails upward: a
//! full cache is logged and the newcomer is ignored.

use tracing::{debug, info, warn};

use crate::domain::capabilities::Band;
use crate::domain::peers::LegacyClass;
use crate::protocol::frames::BeaconBody;
use crate::protocol::ie::{self, ErpInfo, HtOperation};
use crate::protocol::mac::MacAddr;

/// HT operating mode, ordered by priority (`Pure` lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum HtOperatingMode {
    #[default]
    Pure,
    NoLegacy20MhzHt,
    OverlapLegacy,
    Mixed,
}

impl HtOperatingMode {
    /// Value of the 2-bit HT protection field.
    pub fn to_wire(self) -> u8 {
        match self {
            HtOperatingMode::Pure => 0,
            HtOperatingMode::OverlapLegacy => 1,
            HtOperatingMode::NoLegacy20MhzHt => 2,
            HtOperatingMode::Mixed => 3,
        }
    }

    pub fn from_wire(value: u8) -> Self {
        match value & 0x03 {
            1 => HtOperatingMode::OverlapLegacy,
            2 => HtOperatingMode::NoLegacy20MhzHt,
            3 => HtOperatingMode::Mixed,
            _ => HtOperatingMode::Pure,
        }
    }
}

/// The protection bits an AP advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtectionFlags {
    /// 11b stations present (ours or overlapping): ERP "use protection".
    pub llb_coexist: bool,
    /// One of *our* peers is non-ERP: ERP "non-ERP present".
    pub non_erp_present: bool,
    /// Non-HT ERP/OFDM stations present.
    pub llg_coexist: bool,
    /// 20 MHz-only HT stations present in a 40 MHz BSS.
    pub ht20_coexist: bool,
    pub non_gf_present: bool,
    pub lsig_txop_full_support: bool,
    pub rifs_mode: bool,
    /// A non-HT overlapping BSS was heard.
    pub obss_non_ht_present: bool,
}

/// Accumulated beacon change since the caller last drained it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconUpdate {
    pub changed: u16,
    pub flags: ProtectionFlags,
    pub ht_op_mode: HtOperatingMode,
}

impl BeaconUpdate {
    pub const ERP: u16 = 1 << 0;
    pub const LLG: u16 = 1 << 1;
    pub const HT20: u16 = 1 << 2;
    pub const NON_GF: u16 = 1 << 3;
    pub const LSIG_TXOP: u16 = 1 << 4;
    pub const RIFS: u16 = 1 << 5;
    pub const OBSS_NON_HT: u16 = 1 << 6;
    pub const HT_OP_MODE: u16 = 1 << 7;

    pub fn has(&self, bit: u16) -> bool {
        self.changed & bit != 0
    }
}

/// Static parameters of the BSS the engine protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionConfig {
    /// Size of each offending-address cache.
    pub cache_size: usize,
    pub band: Band,
    /// The BSS itself is HT.
    pub ht_enabled: bool,
    /// The BSS operates at 40 MHz.
    pub bss_40mhz: bool,
    /// RIFS may be advertised when conditions allow.
    pub rifs_permitted: bool,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            cache_size: 16,
            band: Band::TwoGhz,
            ht_enabled: true,
            bss_40mhz: false,
            rifs_permitted: false,
        }
    }
}

/// What a neighbour beacon tells us about an overlapping BSS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlapObservation {
    pub non_erp: bool,
    pub non_ht: bool,
    pub ht20_only: bool,
    pub non_gf: bool,
}

impl OverlapObservation {
    pub fn from_beacon(beacon: &BeaconBody) -> Self {
        let non_ht = beacon.ht_cap.is_none();
        Self {
            non_erp: beacon.erp.map(|e| e.non_erp_present()).unwrap_or(false) || ie::is_dsss_only(&beacon.rates),
            non_ht,
            ht20_only: beacon.ht_cap.map(|ht| !ht.supports_40mhz()).unwrap_or(false),
            non_gf: beacon.ht_op.map(|op| op.non_greenfield_present()).unwrap_or(false)
                || beacon.ht_cap.map(|ht| !ht.greenfield()).unwrap_or(false),
        }
    }
}

/// Tracked protection categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Legacy11b,
    Legacy11g,
    Ht20,
    NonGreenfield,
    NoLsigTxop,
}

impl Category {
    const ALL: [Category; 5] = [
        Category::Legacy11b,
        Category::Legacy11g,
        Category::Ht20,
        Category::NonGreenfield,
        Category::NoLsigTxop,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AddOutcome {
    AlreadyPresent,
    Added,
    CacheFull,
}

/// Bounded cache of offending addresses with its counter.
#[derive(Debug, Clone)]
struct Track {
    addrs: Vec<MacAddr>,
    count: u16,
    capacity: usize,
}

impl Track {
    fn new(capacity: usize) -> Self {
        Self {
            addrs: Vec::with_capacity(capacity),
            count: 0,
            capacity,
        }
    }

    fn add(&mut self, mac: MacAddr) -> AddOutcome {
        if self.addrs.contains(&mac) {
            return AddOutcome::AlreadyPresent;
        }
        if self.addrs.len() >= self.capacity {
            return AddOutcome::CacheFull;
        }
        self.addrs.push(mac);
        self.count += 1;
        AddOutcome::Added
    }

    fn remove(&mut self, mac: &MacAddr) -> bool {
        match self.addrs.iter().position(|a| a == mac) {
            Some(idx) => {
                self.addrs.swap_remove(idx);
                self.count -= 1;
                true
            }
            None => false,
        }
    }

    fn reset(&mut self) {
        self.addrs.clear();
        self.count = 0;
    }

    fn active(&self) -> bool {
        self.count > 0
    }
}

/// Per-BSS protection state machine.
#[derive(Debug, Clone)]
pub struct ProtectionEngine {
    config: ProtectionConfig,
    own: Vec<Track>,
    overlap: Vec<Track>,
    flags: ProtectionFlags,
    mode: HtOperatingMode,
    pending: Option<BeaconUpdate>,
}

impl ProtectionEngine {
    pub fn new(config: ProtectionConfig) -> Self {
        let tracks = || Category::ALL.iter().map(|_| Track::new(config.cache_size)).collect::<Vec<_>>();
        let mut engine = Self {
            config,
            own: tracks(),
            overlap: tracks(),
            flags: ProtectionFlags::default(),
            mode: HtOperatingMode::Pure,
            pending: None,
        };
        let (flags, mode) = engine.compute();
        engine.flags = flags;
        engine.mode = mode;
        engine
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    // ── Own BSS track ────────────────────────────────────────────────────────

    /// Records a newly associated peer's deficiencies.
    pub fn on_peer_associated(&mut self, mac: MacAddr, class: LegacyClass) {
        for category in self.categories_for(&class, true) {
            match self.own[category.index()].add(mac) {
                AddOutcome::Added => debug!(peer = %mac, ?category, "own-BSS protection entry added"),
                AddOutcome::AlreadyPresent => {}
                AddOutcome::CacheFull => warn!(peer = %mac, ?category, "own-BSS protection cache full, entry dropped"),
            }
        }
        self.recompute();
    }

    /// Forgets a departed peer.
    pub fn on_peer_removed(&mut self, mac: &MacAddr) {
        let mut removed = false;
        for track in &mut self.own {
            removed |= track.remove(mac);
        }
        if removed {
            self.recompute();
        }
    }

    // ── Overlap track ────────────────────────────────────────────────────────

    /// Records what a co-channel neighbour beacon revealed.
    pub fn on_overlap_beacon(&mut self, bssid: MacAddr, obs: OverlapObservation) {
        let class = LegacyClass {
            non_erp: obs.non_erp,
            non_ht: obs.non_ht,
            ht20_only: obs.ht20_only,
            non_greenfield: obs.non_gf,
            no_lsig_txop: false,
        };
        for category in self.categories_for(&class, false) {
            if let AddOutcome::CacheFull = self.overlap[category.index()].add(bssid) {
                warn!(bssid = %bssid, ?category, "overlap protection cache full, entry dropped");
            }
        }
        self.recompute();
    }

    /// Clears overlap caches; called from the periodic decay timer.
    pub fn decay_overlap(&mut self) {
        for track in &mut self.overlap {
            track.reset();
        }
        self.recompute();
    }

    fn categories_for(&self, class: &LegacyClass, own: bool) -> Vec<Category> {
        let cfg = &self.config;
        let mut out = Vec::new();
        if class.non_erp && cfg.band == Band::TwoGhz {
            out.push(Category::Legacy11b);
        }
        if class.non_ht && !class.non_erp && cfg.ht_enabled {
            out.push(Category::Legacy11g);
        }
        if !class.non_ht && cfg.ht_enabled {
            if class.ht20_only && cfg.bss_40mhz {
                out.push(Category::Ht20);
            }
            if class.non_greenfield {
                out.push(Category::NonGreenfield);
            }
            if class.no_lsig_txop && own {
                out.push(Category::NoLsigTxop);
            }
        }
        out
    }

    // ── Derived state ────────────────────────────────────────────────────────

    fn own_active(&self, c: Category) -> bool {
        self.own[c.index()].active()
    }

    fn overlap_active(&self, c: Category) -> bool {
        self.overlap[c.index()].active()
    }

    fn compute(&self) -> (ProtectionFlags, HtOperatingMode) {
        use Category::*;
        let cfg = &self.config;
        let llb_coexist = self.own_active(Legacy11b) || self.overlap_active(Legacy11b);
        let non_ht_present = self.own_active(Legacy11g) || self.overlap_active(Legacy11g);
        // 11g protection exists only on 2.4 GHz; on 5 GHz a non-HT peer
        // still moves the HT operating mode.
        let llg_coexist = non_ht_present && cfg.band == Band::TwoGhz;
        let non_gf_present = self.own_active(NonGreenfield) || self.overlap_active(NonGreenfield);
        let flags = ProtectionFlags {
            llb_coexist,
            non_erp_present: self.own_active(Legacy11b),
            llg_coexist,
            ht20_coexist: self.own_active(Ht20) || self.overlap_active(Ht20),
            non_gf_present,
            lsig_txop_full_support: cfg.ht_enabled && !self.own_active(NoLsigTxop),
            rifs_mode: cfg.rifs_permitted && cfg.ht_enabled && !non_gf_present && !llb_coexist && !non_ht_present,
            obss_non_ht_present: self.overlap_active(Legacy11b) || self.overlap_active(Legacy11g),
        };
        let mode = if !cfg.ht_enabled {
            HtOperatingMode::Pure
        } else if self.own_active(Legacy11b) || self.own_active(Legacy11g) {
            HtOperatingMode::Mixed
        } else if flags.obss_non_ht_present {
            HtOperatingMode::OverlapLegacy
        } else if flags.ht20_coexist && cfg.bss_40mhz {
            HtOperatingMode::NoLegacy20MhzHt
        } else {
            HtOperatingMode::Pure
        };
        (flags, mode)
    }

    fn recompute(&mut self) {
        let (flags, mode) = self.compute();
        let old = self.flags;
        let mut changed = 0u16;
        if old.llb_coexist != flags.llb_coexist || old.non_erp_present != flags.non_erp_present {
            changed |= BeaconUpdate::ERP;
        }
        if old.llg_coexist != flags.llg_coexist {
            changed |= BeaconUpdate::LLG;
        }
        if old.ht20_coexist != flags.ht20_coexist {
            changed |= BeaconUpdate::HT20;
        }
        if old.non_gf_present != flags.non_gf_present {
            changed |= BeaconUpdate::NON_GF;
        }
        if old.lsig_txop_full_support != flags.lsig_txop_full_support {
            changed |= BeaconUpdate::LSIG_TXOP;
        }
        if old.rifs_mode != flags.rifs_mode {
            changed |= BeaconUpdate::RIFS;
        }
        if old.obss_non_ht_present != flags.obss_non_ht_present {
            changed |= BeaconUpdate::OBSS_NON_HT;
        }
        if self.mode != mode {
            changed |= BeaconUpdate::HT_OP_MODE;
        }
        self.flags = flags;
        self.mode = mode;
        if changed == 0 {
            return;
        }
        info!(changed = format_args!("0x{changed:04x}"), ?mode, ?flags, "protection changed");
        let pending = self.pending.get_or_insert(BeaconUpdate {
            changed: 0,
            flags,
            ht_op_mode: mode,
        });
        pending.changed |= changed;
        pending.flags = flags;
        pending.ht_op_mode = mode;
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    pub fn flags(&self) -> ProtectionFlags {
        self.flags
    }

    pub fn ht_operating_mode(&self) -> HtOperatingMode {
        self.mode
    }

    pub fn own_count(&self, category: Category) -> u16 {
        self.own[category.index()].count
    }

    pub fn overlap_count(&self, category: Category) -> u16 {
        self.overlap[category.index()].count
    }

    /// Returns and clears the accumulated beacon change, if any.
    pub fn take_beacon_update(&mut self) -> Option<BeaconUpdate> {
        self.pending.take()
    }

    /// ERP element value to advertise.
    pub fn erp_info(&self) -> ErpInfo {
        let mut bits = 0;
        if self.flags.non_erp_present {
            bits |= ErpInfo::NON_ERP_PRESENT;
        }
        if self.flags.llb_coexist {
            bits |= ErpInfo::USE_PROTECTION | ErpInfo::BARKER_PREAMBLE;
        }
        ErpInfo(bits)
    }

    /// Writes the protection fields into an HT Operation element.
    pub fn apply_to_ht_operation(&self, op: &mut HtOperation) {
        op.set_ht_protection(self.mode.to_wire());
        op.set_non_greenfield_present(self.flags.non_gf_present);
        op.set_obss_non_ht_present(self.flags.obss_non_ht_present);
        op.set_rifs_mode(self.flags.rifs_mode);
        op.set_lsig_txop_full_support(self.flags.lsig_txop_full_support);
    }
}
