//! MAC addresses, the frame-control word, and the 24-byte management header.
//!
//! # Layout of a management header (for beginners)
//!
//! Every 802.11 management frame starts with the same fixed header:
//!
//! ```text
//! [frame_control:2][duration:2][addr1 (DA):6][addr2 (SA):6][addr3 (BSSID):6][seq_ctrl:2]
//! ```
//!
//! Unlike most network protocols, 802.11 encodes multi-byte integers in
//! **little-endian** order.  The sequence-control field packs a 4-bit fragment
//! number in the low bits and the 12-bit sequence number above it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::codec::ProtocolError;

/// Size of the management frame header in bytes.
pub const MGMT_HEADER_LEN: usize = 24;

/// Frame-control bits used by the management plane.
pub mod frame_control {
    /// Type field value (bits 2-3) for management frames.
    pub const TYPE_MGMT: u16 = 0b00 << 2;
    /// Mask covering the type field.
    pub const TYPE_MASK: u16 = 0b11 << 2;
    /// Mask covering the protocol-version field.
    pub const VERSION_MASK: u16 = 0b11;
    /// Retry bit: set on every retransmission of the same frame.
    pub const RETRY: u16 = 1 << 11;
    /// Protected-frame bit: the body is encrypted.
    pub const PROTECTED: u16 = 1 << 14;
}

// ── MAC address ───────────────────────────────────────────────────────────────

/// Error returned when parsing a textual MAC address fails.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid MAC address '{0}': expected six colon-separated hex octets")]
pub struct MacParseError(pub String);

/// A 48-bit IEEE MAC address.
///
/// Serialized as the usual `aa:bb:cc:dd:ee:ff` string so configuration files
/// stay readable.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// `ff:ff:ff:ff:ff:ff`
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);
    /// `00:00:00:00:00:00`
    pub const ZERO: MacAddr = MacAddr([0; 6]);

    /// Returns the raw octets.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Group addresses have the I/G bit (LSB of the first octet) set.
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl From<[u8; 6]> for MacAddr {
    fn from(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({self})")
    }
}

impl FromStr for MacAddr {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(|| MacParseError(s.to_string()))?;
            if part.len() != 2 {
                return Err(MacParseError(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacParseError(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacParseError(s.to_string()));
        }
        Ok(MacAddr(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = MacParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(addr: MacAddr) -> Self {
        addr.to_string()
    }
}

// ── Management subtypes ───────────────────────────────────────────────────────

/// Management frame subtype (frame-control bits 4-7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MgmtSubtype {
    AssocRequest = 0,
    AssocResponse = 1,
    ReassocRequest = 2,
    ReassocResponse = 3,
    ProbeRequest = 4,
    ProbeResponse = 5,
    Beacon = 8,
    Disassociation = 10,
    Authentication = 11,
    Deauthentication = 12,
    Action = 13,
    ActionNoAck = 14,
}

impl TryFrom<u8> for MgmtSubtype {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0 => Ok(MgmtSubtype::AssocRequest),
            1 => Ok(MgmtSubtype::AssocResponse),
            2 => Ok(MgmtSubtype::ReassocRequest),
            3 => Ok(MgmtSubtype::ReassocResponse),
            4 => Ok(MgmtSubtype::ProbeRequest),
            5 => Ok(MgmtSubtype::ProbeResponse),
            8 => Ok(MgmtSubtype::Beacon),
            10 => Ok(MgmtSubtype::Disassociation),
            11 => Ok(MgmtSubtype::Authentication),
            12 => Ok(MgmtSubtype::Deauthentication),
            13 => Ok(MgmtSubtype::Action),
            14 => Ok(MgmtSubtype::ActionNoAck),
            _ => Err(()),
        }
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// The fixed 24-byte header of a management frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MgmtHeader {
    pub subtype: MgmtSubtype,
    /// Body is WEP/CCMP protected.
    pub protected: bool,
    /// Frame is a retransmission.
    pub retry: bool,
    pub duration: u16,
    /// Destination (addr1).
    pub da: MacAddr,
    /// Source / transmitter (addr2).
    pub sa: MacAddr,
    /// BSSID (addr3).
    pub bssid: MacAddr,
    /// 12-bit sequence number.
    pub sequence: u16,
    /// 4-bit fragment number.
    pub fragment: u8,
}

impl MgmtHeader {
    /// Creates an unprotected, unfragmented header with sequence number 0.
    pub fn new(subtype: MgmtSubtype, da: MacAddr, sa: MacAddr, bssid: MacAddr) -> Self {
        Self {
            subtype,
            protected: false,
            retry: false,
            duration: 0,
            da,
            sa,
            bssid,
            sequence: 0,
            fragment: 0,
        }
    }

    /// Computes the 16-bit frame-control word for this header.
    pub fn frame_control(&self) -> u16 {
        let mut fc = frame_control::TYPE_MGMT | ((self.subtype as u16) << 4);
        if self.retry {
            fc |= frame_control::RETRY;
        }
        if self.protected {
            fc |= frame_control::PROTECTED;
        }
        fc
    }

    /// Appends the 24 header bytes to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.frame_control().to_le_bytes());
        buf.extend_from_slice(&self.duration.to_le_bytes());
        buf.extend_from_slice(&self.da.0);
        buf.extend_from_slice(&self.sa.0);
        buf.extend_from_slice(&self.bssid.0);
        let seq_ctrl = ((self.sequence & 0x0fff) << 4) | (self.fragment as u16 & 0x0f);
        buf.extend_from_slice(&seq_ctrl.to_le_bytes());
    }

    /// Parses the header at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InsufficientData`] for short input,
    /// [`ProtocolError::NotManagement`] when the type field is not management,
    /// and [`ProtocolError::UnknownSubtype`] for reserved subtypes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes.len() < MGMT_HEADER_LEN {
            return Err(ProtocolError::InsufficientData {
                needed: MGMT_HEADER_LEN,
                available: bytes.len(),
            });
        }
        let fc = u16::from_le_bytes([bytes[0], bytes[1]]);
        if fc & frame_control::VERSION_MASK != 0 || fc & frame_control::TYPE_MASK != frame_control::TYPE_MGMT {
            return Err(ProtocolError::NotManagement(fc));
        }
        let subtype_raw = ((fc >> 4) & 0x0f) as u8;
        let subtype =
            MgmtSubtype::try_from(subtype_raw).map_err(|_| ProtocolError::UnknownSubtype(subtype_raw))?;
        let duration = u16::from_le_bytes([bytes[2], bytes[3]]);
        let seq_ctrl = u16::from_le_bytes([bytes[22], bytes[23]]);
        Ok(Self {
            subtype,
            protected: fc & frame_control::PROTECTED != 0,
            retry: fc & frame_control::RETRY != 0,
            duration,
            da: read_addr(bytes, 4),
            sa: read_addr(bytes, 10),
            bssid: read_addr(bytes, 16),
            sequence: seq_ctrl >> 4,
            fragment: (seq_ctrl & 0x0f) as u8,
        })
    }
}

/// Sets the retry bit in an already-encoded frame, in place.
///
/// Used by the transmit pipeline when it resends a frame whose bytes it
/// still owns.  Buffers shorter than two bytes are left untouched.
pub fn mark_retry(frame: &mut [u8]) {
    if frame.len() >= 2 {
        frame[1] |= (frame_control::RETRY >> 8) as u8;
    }
}

fn read_addr(bytes: &[u8], offset: usize) -> MacAddr {
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&bytes[offset..offset + 6]);
    MacAddr(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AP: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01]);
    const STA: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x07]);

    #[test]
    fn test_mac_display_and_parse_agree() {
        // Arrange
        let text = "aa:bb:cc:00:00:01";

        // Act
        let parsed: MacAddr = text.parse().expect("valid mac");

        // Assert
        assert_eq!(parsed, AP);
        assert_eq!(parsed.to_string(), text);
    }

    #[test]
    fn test_mac_parse_accepts_dash_separator() {
        let parsed: MacAddr = "AA-BB-CC-00-00-01".parse().expect("valid mac");
        assert_eq!(parsed, AP);
    }

    #[test]
    fn test_mac_parse_rejects_short_and_long_input() {
        assert!("aa:bb:cc".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:00:00:01:02".parse::<MacAddr>().is_err());
        assert!("aa:bb:cc:00:00:zz".parse::<MacAddr>().is_err());
    }

    #[test]
    fn test_broadcast_is_multicast() {
        assert!(MacAddr::BROADCAST.is_broadcast());
        assert!(MacAddr::BROADCAST.is_multicast());
        assert!(!AP.is_multicast());
    }

    #[test]
    fn test_header_encode_is_24_bytes_little_endian() {
        // Arrange
        let mut header = MgmtHeader::new(MgmtSubtype::Authentication, AP, STA, AP);
        header.sequence = 0x123;

        // Act
        let mut buf = Vec::new();
        header.encode(&mut buf);

        // Assert
        assert_eq!(buf.len(), MGMT_HEADER_LEN);
        assert_eq!(buf[0], 0xb0, "subtype 11 in bits 4-7");
        assert_eq!(buf[1], 0x00);
        assert_eq!(&buf[4..10], &AP.0);
        assert_eq!(&buf[10..16], &STA.0);
        assert_eq!(u16::from_le_bytes([buf[22], buf[23]]), 0x123 << 4);
    }

    #[test]
    fn test_header_round_trip_preserves_flags() {
        // Arrange
        let mut header = MgmtHeader::new(MgmtSubtype::Deauthentication, STA, AP, AP);
        header.protected = true;
        header.retry = true;
        header.sequence = 4095;
        header.fragment = 3;
        let mut buf = Vec::new();
        header.encode(&mut buf);

        // Act
        let decoded = MgmtHeader::decode(&buf).expect("decode");

        // Assert
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_decode_rejects_short_input() {
        let err = MgmtHeader::decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientData {
                needed: MGMT_HEADER_LEN,
                available: 10
            }
        );
    }

    #[test]
    fn test_header_decode_rejects_data_frames() {
        let mut buf = vec![0u8; MGMT_HEADER_LEN];
        buf[0] = 0x08; // type = data
        assert!(matches!(
            MgmtHeader::decode(&buf),
            Err(ProtocolError::NotManagement(_))
        ));
    }

    #[test]
    fn test_header_decode_rejects_reserved_subtype() {
        let mut buf = vec![0u8; MGMT_HEADER_LEN];
        buf[0] = 0x60; // subtype 6 is reserved
        assert_eq!(MgmtHeader::decode(&buf), Err(ProtocolError::UnknownSubtype(6)));
    }

    #[test]
    fn test_mark_retry_sets_bit_in_place() {
        // Arrange
        let header = MgmtHeader::new(MgmtSubtype::ReassocRequest, AP, STA, AP);
        let mut buf = Vec::new();
        header.encode(&mut buf);

        // Act
        mark_retry(&mut buf);

        // Assert
        let decoded = MgmtHeader::decode(&buf).expect("decode");
        assert!(decoded.retry);
        assert_eq!(decoded.subtype, MgmtSubtype::ReassocRequest);
    }
}
