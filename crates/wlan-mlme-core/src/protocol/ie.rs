//! Information elements (IEs): reader, writer, and the typed elements the
//! MLME needs to understand.
//!
//! # What is an information element? (for beginners)
//!
//! After the fixed fields, most management frame bodies are a flat list of
//! type-length-value records:
//!
//! ```text
//! [id:1][len:1][body:len] [id:1][len:1][body:len] ...
//! ```
//!
//! Because the length is a single byte, no element body can exceed 255 bytes.
//! Element id 255 is an "extension" element whose first body byte is a second
//! id, used by newer amendments such as 802.11ax (HE).
//!
//! Unknown elements are skipped by readers, which is what makes the format
//! forward compatible.

use crate::protocol::codec::ProtocolError;

/// Element ids used by the MLME.
pub mod id {
    pub const SSID: u8 = 0;
    pub const SUPPORTED_RATES: u8 = 1;
    pub const DS_PARAMS: u8 = 3;
    pub const TIM: u8 = 5;
    pub const CHALLENGE_TEXT: u8 = 16;
    pub const CHANNEL_SWITCH: u8 = 37;
    pub const MEASUREMENT_REPORT: u8 = 39;
    pub const ERP: u8 = 42;
    pub const HT_CAPABILITIES: u8 = 45;
    pub const RSN: u8 = 48;
    pub const EXT_SUPPORTED_RATES: u8 = 50;
    pub const NEIGHBOR_REPORT: u8 = 52;
    pub const MOBILITY_DOMAIN: u8 = 54;
    pub const FAST_BSS_TRANSITION: u8 = 55;
    pub const TIMEOUT_INTERVAL: u8 = 56;
    pub const EXT_CHANNEL_SWITCH: u8 = 60;
    pub const HT_OPERATION: u8 = 61;
    pub const EXT_CAPABILITIES: u8 = 127;
    pub const VHT_CAPABILITIES: u8 = 191;
    pub const VHT_OPERATION: u8 = 192;
    pub const VENDOR_SPECIFIC: u8 = 221;
    pub const EXTENSION: u8 = 255;
}

/// Extension element ids (first body byte of an element with id 255).
pub mod ext_id {
    pub const HE_CAPABILITIES: u8 = 35;
    pub const HE_OPERATION: u8 = 36;
}

/// Microsoft OUI used by the legacy WPA element.
pub const WPA_OUI: [u8; 3] = [0x00, 0x50, 0xf2];
pub const WPA_OUI_TYPE: u8 = 1;
/// Wi-Fi Alliance OUI used by P2P elements.
pub const WFA_OUI: [u8; 3] = [0x50, 0x6f, 0x9a];
pub const P2P_OUI_TYPE: u8 = 9;

/// Largest body an element can carry.
pub const MAX_ELEMENT_BODY: usize = 255;

/// Shared-key challenge text length used by every deployed AP.
pub const CHALLENGE_TEXT_LEN: usize = 128;

// ── Reader ────────────────────────────────────────────────────────────────────

/// One raw element borrowed from a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element<'a> {
    pub id: u8,
    pub body: &'a [u8],
}

/// Iterates over the elements of a body.
///
/// Yields `Err` once and then stops if the final element is truncated.
pub struct IeReader<'a> {
    bytes: &'a [u8],
    failed: bool,
}

impl<'a> IeReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, failed: false }
    }
}

impl<'a> Iterator for IeReader<'a> {
    type Item = Result<Element<'a>, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.bytes.is_empty() {
            return None;
        }
        if self.bytes.len() < 2 {
            self.failed = true;
            return Some(Err(ProtocolError::InsufficientData {
                needed: 2,
                available: self.bytes.len(),
            }));
        }
        let id = self.bytes[0];
        let len = self.bytes[1] as usize;
        if self.bytes.len() < 2 + len {
            self.failed = true;
            return Some(Err(ProtocolError::MalformedElement {
                id,
                reason: format!("declares {len} bytes, {} available", self.bytes.len() - 2),
            }));
        }
        let body = &self.bytes[2..2 + len];
        self.bytes = &self.bytes[2 + len..];
        Some(Ok(Element { id, body }))
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Appends one element to `buf`.
///
/// # Errors
///
/// Returns [`ProtocolError::ElementTooLong`] when `body` exceeds 255 bytes.
pub fn write_element(buf: &mut Vec<u8>, id: u8, body: &[u8]) -> Result<(), ProtocolError> {
    if body.len() > MAX_ELEMENT_BODY {
        return Err(ProtocolError::ElementTooLong { id, len: body.len() });
    }
    buf.push(id);
    buf.push(body.len() as u8);
    buf.extend_from_slice(body);
    Ok(())
}

/// Appends an extension element (id 255) carrying `ext_id` as its first byte.
pub fn write_ext_element(buf: &mut Vec<u8>, ext_id: u8, body: &[u8]) -> Result<(), ProtocolError> {
    if body.len() + 1 > MAX_ELEMENT_BODY {
        return Err(ProtocolError::ElementTooLong {
            id: id::EXTENSION,
            len: body.len() + 1,
        });
    }
    buf.push(id::EXTENSION);
    buf.push((body.len() + 1) as u8);
    buf.push(ext_id);
    buf.extend_from_slice(body);
    Ok(())
}

/// Writes a rate list, spilling anything past the eighth rate into an
/// Extended Supported Rates element.
pub fn write_rates(buf: &mut Vec<u8>, rates: &[u8]) -> Result<(), ProtocolError> {
    if rates.is_empty() {
        return Ok(());
    }
    let split = rates.len().min(8);
    write_element(buf, id::SUPPORTED_RATES, &rates[..split])?;
    if rates.len() > split {
        write_element(buf, id::EXT_SUPPORTED_RATES, &rates[split..])?;
    }
    Ok(())
}

// ── Rates ─────────────────────────────────────────────────────────────────────

/// Basic-rate flag in a rate octet.
pub const BASIC_RATE: u8 = 0x80;

/// Returns the rate value in 500 kb/s units without the basic flag.
pub fn rate_value(rate: u8) -> u8 {
    rate & !BASIC_RATE
}

/// DSSS/CCK rates (1, 2, 5.5, 11 Mb/s) that 802.11b stations support.
pub const DSSS_CCK_RATES: [u8; 4] = [2, 4, 11, 22];

/// True when every rate in `rates` is an 802.11b rate.
pub fn is_dsss_only(rates: &[u8]) -> bool {
    !rates.is_empty() && rates.iter().all(|r| DSSS_CCK_RATES.contains(&rate_value(*r)))
}

// ── HT capabilities ───────────────────────────────────────────────────────────

/// HT Capabilities element (802.11n), 26-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HtCapabilities {
    pub cap_info: u16,
    pub ampdu_params: u8,
    pub mcs_set: [u8; 16],
    pub ext_cap: u16,
    pub txbf_cap: u32,
    pub asel_cap: u8,
}

impl HtCapabilities {
    pub const LEN: usize = 26;

    pub const LDPC: u16 = 0x0001;
    pub const CHAN_WIDTH_40: u16 = 0x0002;
    pub const GREENFIELD: u16 = 0x0010;
    pub const SHORT_GI_20: u16 = 0x0020;
    pub const SHORT_GI_40: u16 = 0x0040;
    pub const DSSS_CCK_40: u16 = 0x1000;
    pub const LSIG_TXOP_PROTECTION: u16 = 0x8000;

    pub fn supports_40mhz(&self) -> bool {
        self.cap_info & Self::CHAN_WIDTH_40 != 0
    }

    pub fn greenfield(&self) -> bool {
        self.cap_info & Self::GREENFIELD != 0
    }

    pub fn lsig_txop_protection(&self) -> bool {
        self.cap_info & Self::LSIG_TXOP_PROTECTION != 0
    }

    /// Appends the element body.
    pub fn write_body(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.cap_info.to_le_bytes());
        buf.push(self.ampdu_params);
        buf.extend_from_slice(&self.mcs_set);
        buf.extend_from_slice(&self.ext_cap.to_le_bytes());
        buf.extend_from_slice(&self.txbf_cap.to_le_bytes());
        buf.push(self.asel_cap);
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::HT_CAPABILITIES, body, Self::LEN)?;
        let mut mcs_set = [0u8; 16];
        mcs_set.copy_from_slice(&body[3..19]);
        Ok(Self {
            cap_info: u16::from_le_bytes([body[0], body[1]]),
            ampdu_params: body[2],
            mcs_set,
            ext_cap: u16::from_le_bytes([body[19], body[20]]),
            txbf_cap: u32::from_le_bytes([body[21], body[22], body[23], body[24]]),
            asel_cap: body[25],
        })
    }
}

// ── HT operation ──────────────────────────────────────────────────────────────

/// HT Operation element, 22-byte body.  Advertised by APs in beacons and
/// (re)association responses; carries the protection fields the
/// [`ProtectionEngine`](crate::domain::protection::ProtectionEngine) drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HtOperation {
    pub primary_channel: u8,
    pub info: [u8; 5],
    pub basic_mcs_set: [u8; 16],
}

impl HtOperation {
    pub const LEN: usize = 22;

    /// Secondary channel offset: 0 none, 1 above, 3 below.
    pub fn secondary_channel_offset(&self) -> u8 {
        self.info[0] & 0x03
    }

    pub fn sta_channel_width_any(&self) -> bool {
        self.info[0] & 0x04 != 0
    }

    pub fn rifs_mode(&self) -> bool {
        self.info[0] & 0x08 != 0
    }

    pub fn set_rifs_mode(&mut self, on: bool) {
        set_bit(&mut self.info[0], 0x08, on);
    }

    /// Raw 2-bit HT protection field.
    pub fn ht_protection(&self) -> u8 {
        self.info[1] & 0x03
    }

    pub fn set_ht_protection(&mut self, mode: u8) {
        self.info[1] = (self.info[1] & !0x03) | (mode & 0x03);
    }

    pub fn non_greenfield_present(&self) -> bool {
        self.info[1] & 0x04 != 0
    }

    pub fn set_non_greenfield_present(&mut self, on: bool) {
        set_bit(&mut self.info[1], 0x04, on);
    }

    pub fn obss_non_ht_present(&self) -> bool {
        self.info[1] & 0x10 != 0
    }

    pub fn set_obss_non_ht_present(&mut self, on: bool) {
        set_bit(&mut self.info[1], 0x10, on);
    }

    pub fn lsig_txop_full_support(&self) -> bool {
        self.info[4] & 0x02 != 0
    }

    pub fn set_lsig_txop_full_support(&mut self, on: bool) {
        set_bit(&mut self.info[4], 0x02, on);
    }

    pub fn write_body(&self, buf: &mut Vec<u8>) {
        buf.push(self.primary_channel);
        buf.extend_from_slice(&self.info);
        buf.extend_from_slice(&self.basic_mcs_set);
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::HT_OPERATION, body, Self::LEN)?;
        let mut info = [0u8; 5];
        info.copy_from_slice(&body[1..6]);
        let mut basic_mcs_set = [0u8; 16];
        basic_mcs_set.copy_from_slice(&body[6..22]);
        Ok(Self {
            primary_channel: body[0],
            info,
            basic_mcs_set,
        })
    }
}

fn set_bit(byte: &mut u8, mask: u8, on: bool) {
    if on {
        *byte |= mask;
    } else {
        *byte &= !mask;
    }
}

// ── VHT capabilities ──────────────────────────────────────────────────────────

/// VHT Capabilities element (802.11ac), 12-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VhtCapabilities {
    pub info: u32,
    pub rx_mcs_map: u16,
    pub rx_highest_rate: u16,
    pub tx_mcs_map: u16,
    pub tx_highest_rate: u16,
}

impl VhtCapabilities {
    pub const LEN: usize = 12;

    /// Supported channel width set (bits 2-3 of the info field).
    pub fn supported_channel_width_set(&self) -> u8 {
        ((self.info >> 2) & 0x03) as u8
    }

    pub fn write_body(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.info.to_le_bytes());
        buf.extend_from_slice(&self.rx_mcs_map.to_le_bytes());
        buf.extend_from_slice(&self.rx_highest_rate.to_le_bytes());
        buf.extend_from_slice(&self.tx_mcs_map.to_le_bytes());
        buf.extend_from_slice(&self.tx_highest_rate.to_le_bytes());
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::VHT_CAPABILITIES, body, Self::LEN)?;
        Ok(Self {
            info: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
            rx_mcs_map: u16::from_le_bytes([body[4], body[5]]),
            rx_highest_rate: u16::from_le_bytes([body[6], body[7]]),
            tx_mcs_map: u16::from_le_bytes([body[8], body[9]]),
            tx_highest_rate: u16::from_le_bytes([body[10], body[11]]),
        })
    }
}

// ── HE capabilities ───────────────────────────────────────────────────────────

/// HE Capabilities extension element (802.11ax).
///
/// The MCS/NSS block is 4, 8, or 12 bytes depending on which channel widths
/// the PHY info advertises; anything after it is the optional PPE threshold
/// block, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeCapabilities {
    pub mac_info: [u8; 6],
    pub phy_info: [u8; 11],
    pub mcs_nss: Vec<u8>,
    pub ppe_thresholds: Vec<u8>,
}

impl HeCapabilities {
    const FIXED_LEN: usize = 17;
    const WIDTH_160: u8 = 0x08;
    const WIDTH_80P80: u8 = 0x10;

    /// Length of the MCS/NSS block implied by `phy_info`.
    pub fn mcs_nss_len(phy_info: &[u8; 11]) -> usize {
        let mut len = 4;
        if phy_info[0] & Self::WIDTH_160 != 0 {
            len += 4;
        }
        if phy_info[0] & Self::WIDTH_80P80 != 0 {
            len += 4;
        }
        len
    }

    pub fn write_body(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.mac_info);
        buf.extend_from_slice(&self.phy_info);
        buf.extend_from_slice(&self.mcs_nss);
        buf.extend_from_slice(&self.ppe_thresholds);
    }

    /// Parses the body *after* the extension id byte.
    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::EXTENSION, body, Self::FIXED_LEN)?;
        let mut mac_info = [0u8; 6];
        mac_info.copy_from_slice(&body[0..6]);
        let mut phy_info = [0u8; 11];
        phy_info.copy_from_slice(&body[6..17]);
        let mcs_len = Self::mcs_nss_len(&phy_info);
        require_element_len(id::EXTENSION, body, Self::FIXED_LEN + mcs_len)?;
        Ok(Self {
            mac_info,
            phy_info,
            mcs_nss: body[17..17 + mcs_len].to_vec(),
            ppe_thresholds: body[17 + mcs_len..].to_vec(),
        })
    }
}

// ── ERP ───────────────────────────────────────────────────────────────────────

/// ERP Information element, a single flags byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErpInfo(pub u8);

impl ErpInfo {
    pub const NON_ERP_PRESENT: u8 = 0x01;
    pub const USE_PROTECTION: u8 = 0x02;
    pub const BARKER_PREAMBLE: u8 = 0x04;

    pub fn non_erp_present(&self) -> bool {
        self.0 & Self::NON_ERP_PRESENT != 0
    }

    pub fn use_protection(&self) -> bool {
        self.0 & Self::USE_PROTECTION != 0
    }

    pub fn barker_preamble(&self) -> bool {
        self.0 & Self::BARKER_PREAMBLE != 0
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::ERP, body, 1)?;
        Ok(Self(body[0]))
    }
}

// ── Fast BSS transition ───────────────────────────────────────────────────────

/// Mobility Domain element (802.11r), 3-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MobilityDomain {
    pub mdid: [u8; 2],
    pub ft_capability: u8,
}

impl MobilityDomain {
    pub const LEN: usize = 3;
    /// FT over the distribution system supported.
    pub const FT_OVER_DS: u8 = 0x01;

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.mdid[0], self.mdid[1], self.ft_capability]
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::MOBILITY_DOMAIN, body, Self::LEN)?;
        Ok(Self {
            mdid: [body[0], body[1]],
            ft_capability: body[2],
        })
    }
}

// ── Channel switch ────────────────────────────────────────────────────────────

/// Channel Switch Announcement element, 3-byte body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSwitchAnnouncement {
    /// 1 = stop transmitting until the switch.
    pub mode: u8,
    pub new_channel: u8,
    /// Beacon intervals until the switch.
    pub count: u8,
}

impl ChannelSwitchAnnouncement {
    pub const LEN: usize = 3;

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.mode, self.new_channel, self.count]
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::CHANNEL_SWITCH, body, Self::LEN)?;
        Ok(Self {
            mode: body[0],
            new_channel: body[1],
            count: body[2],
        })
    }
}

/// Extended Channel Switch Announcement, 4-byte body (adds operating class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtChannelSwitchAnnouncement {
    pub mode: u8,
    pub new_operating_class: u8,
    pub new_channel: u8,
    pub count: u8,
}

impl ExtChannelSwitchAnnouncement {
    pub const LEN: usize = 4;

    pub fn to_bytes(&self) -> [u8; 4] {
        [self.mode, self.new_operating_class, self.new_channel, self.count]
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::EXT_CHANNEL_SWITCH, body, Self::LEN)?;
        Ok(Self {
            mode: body[0],
            new_operating_class: body[1],
            new_channel: body[2],
            count: body[3],
        })
    }
}

// ── Vendor ────────────────────────────────────────────────────────────────────

/// Vendor Specific element: OUI, OUI type, opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorIe {
    pub oui: [u8; 3],
    pub oui_type: u8,
    pub body: Vec<u8>,
}

impl VendorIe {
    pub fn new(oui: [u8; 3], oui_type: u8, body: Vec<u8>) -> Self {
        Self { oui, oui_type, body }
    }

    pub fn is_wpa(&self) -> bool {
        self.oui == WPA_OUI && self.oui_type == WPA_OUI_TYPE
    }

    pub fn is_p2p(&self) -> bool {
        self.oui == WFA_OUI && self.oui_type == P2P_OUI_TYPE
    }

    /// Total bytes this element occupies on the air, header included.
    pub fn encoded_len(&self) -> usize {
        2 + 4 + self.body.len()
    }

    pub fn write(&self, buf: &mut Vec<u8>) -> Result<(), ProtocolError> {
        let mut body = Vec::with_capacity(4 + self.body.len());
        body.extend_from_slice(&self.oui);
        body.push(self.oui_type);
        body.extend_from_slice(&self.body);
        write_element(buf, id::VENDOR_SPECIFIC, &body)
    }

    pub fn parse(body: &[u8]) -> Result<Self, ProtocolError> {
        require_element_len(id::VENDOR_SPECIFIC, body, 4)?;
        Ok(Self {
            oui: [body[0], body[1], body[2]],
            oui_type: body[3],
            body: body[4..].to_vec(),
        })
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_element_len(id: u8, body: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if body.len() < needed {
        Err(ProtocolError::MalformedElement {
            id,
            reason: format!("need {needed} bytes, got {}", body.len()),
        })
    } else {
        Ok(())
    }
}
