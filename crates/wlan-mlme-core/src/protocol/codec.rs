//! Encoder and decoder for whole 802.11 management frames.
//!
//! Wire format:
//! ```text
//! [management header:24][fixed fields:N][information elements:M]
//! ```
//! All multi-byte integers are little-endian.  The fixed fields depend on the
//! subtype (see [`crate::protocol::frames`]); elements follow the usual
//! `[id][len][body]` layout (see [`crate::protocol::ie`]).
//!
//! Decoding never panics: short or inconsistent input yields a
//! [`ProtocolError`].

use thiserror::Error;

use crate::protocol::frames::{
    category, ActionFrame, AssocRequest, AssocResponse, AuthAlgorithm, Authentication, BeaconBody,
    CapabilityInfo, Disconnect, MgmtBody, MgmtFrame, ProbeRequest, ReasonCode, StatusCode,
};
use crate::protocol::ie::{
    self, ext_id, id, ChannelSwitchAnnouncement, ErpInfo, ExtChannelSwitchAnnouncement,
    HeCapabilities, HtCapabilities, HtOperation, IeReader, MobilityDomain, VendorIe,
    VhtCapabilities, WPA_OUI, WPA_OUI_TYPE,
};
use crate::protocol::mac::{MacAddr, MgmtHeader, MgmtSubtype, MGMT_HEADER_LEN};

/// Element id of the TSPEC element inside ADDTS frames.
const TSPEC_ELEMENT: u8 = 13;
/// Element id of the TPC Report element inside link measurement reports.
const TPC_REPORT_ELEMENT: u8 = 35;
/// The two most significant bits of the AID field are always set on the air.
const AID_WIRE_BITS: u16 = 0xc000;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame-control type is not "management".
    #[error("not a management frame: frame control 0x{0:04X}")]
    NotManagement(u16),

    /// The subtype nibble is reserved.
    #[error("unknown management subtype: {0}")]
    UnknownSubtype(u8),

    /// An authentication algorithm number outside the known set.
    #[error("unknown authentication algorithm: {0}")]
    UnknownAuthAlgorithm(u16),

    /// An element was truncated or had an impossible body.
    #[error("malformed element {id}: {reason}")]
    MalformedElement { id: u8, reason: String },

    /// An element body would not fit in the one-byte length field.
    #[error("element {id} body of {len} bytes exceeds 255")]
    ElementTooLong { id: u8, len: usize },

    /// The fixed fields could not be parsed.
    #[error("malformed body: {0}")]
    MalformedBody(String),

    /// The header subtype disagrees with the body being encoded.
    #[error("header subtype {header:?} does not match body subtype {body:?}")]
    SubtypeMismatch { header: MgmtSubtype, body: MgmtSubtype },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a complete management frame (header + body).
///
/// The sequence number is **not** assigned here – set `frame.header.sequence`
/// from a [`crate::protocol::SequenceCounter`] first.
///
/// # Errors
///
/// Returns [`ProtocolError::SubtypeMismatch`] when the header and body
/// disagree, or [`ProtocolError::ElementTooLong`] when an element overflows.
///
/// # Examples
///
/// ```rust
/// use wlan_mlme_core::protocol::{decode_frame, encode_frame};
/// use wlan_mlme_core::protocol::frames::{Disconnect, MgmtBody, MgmtFrame, ReasonCode};
/// use wlan_mlme_core::protocol::MacAddr;
///
/// let ap = MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 1]);
/// let sta = MacAddr([2, 0, 0, 0, 0, 7]);
/// let frame = MgmtFrame::new(ap, sta, ap, MgmtBody::Deauthentication(Disconnect::new(ReasonCode::UNSPECIFIED)));
/// let bytes = encode_frame(&frame).unwrap();
/// assert_eq!(decode_frame(&bytes).unwrap(), frame);
/// ```
pub fn encode_frame(frame: &MgmtFrame) -> Result<Vec<u8>, ProtocolError> {
    let body_subtype = frame.body.subtype();
    let compatible = frame.header.subtype == body_subtype
        || (frame.header.subtype == MgmtSubtype::ActionNoAck && body_subtype == MgmtSubtype::Action);
    if !compatible {
        return Err(ProtocolError::SubtypeMismatch {
            header: frame.header.subtype,
            body: body_subtype,
        });
    }
    let body = encode_body(&frame.body)?;
    let mut buf = Vec::with_capacity(MGMT_HEADER_LEN + body.len());
    frame.header.encode(&mut buf);
    buf.extend_from_slice(&body);
    Ok(buf)
}

/// Encodes only the body of a frame (everything after the 24-byte header).
///
/// The WEP path uses this to obtain the plaintext it encrypts.
pub fn encode_body(body: &MgmtBody) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match body {
        MgmtBody::AssocRequest(m) | MgmtBody::ReassocRequest(m) => encode_assoc_request(&mut buf, m)?,
        MgmtBody::AssocResponse(m) | MgmtBody::ReassocResponse(m) => encode_assoc_response(&mut buf, m)?,
        MgmtBody::ProbeRequest(m) => encode_probe_request(&mut buf, m)?,
        MgmtBody::ProbeResponse(m) | MgmtBody::Beacon(m) => encode_beacon(&mut buf, m)?,
        MgmtBody::Authentication(m) => encode_authentication(&mut buf, m)?,
        MgmtBody::Deauthentication(m) | MgmtBody::Disassociation(m) => encode_disconnect(&mut buf, m)?,
        MgmtBody::Action(m) => encode_action(&mut buf, m)?,
        MgmtBody::Encrypted { bytes, .. } => buf.extend_from_slice(bytes),
    }
    Ok(buf)
}

/// Decodes a complete management frame.
///
/// Protected frames are returned as [`MgmtBody::Encrypted`]; decrypt the
/// bytes and call [`decode_body`] to obtain the typed body.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<MgmtFrame, ProtocolError> {
    let header = MgmtHeader::decode(bytes)?;
    let payload = &bytes[MGMT_HEADER_LEN..];
    let body = if header.protected {
        MgmtBody::Encrypted {
            subtype: header.subtype,
            bytes: payload.to_vec(),
        }
    } else {
        decode_body(header.subtype, payload)?
    };
    Ok(MgmtFrame { header, body })
}

/// Decodes a body of the given subtype.
pub fn decode_body(subtype: MgmtSubtype, p: &[u8]) -> Result<MgmtBody, ProtocolError> {
    match subtype {
        MgmtSubtype::AssocRequest => decode_assoc_request(p, false).map(MgmtBody::AssocRequest),
        MgmtSubtype::ReassocRequest => decode_assoc_request(p, true).map(MgmtBody::ReassocRequest),
        MgmtSubtype::AssocResponse => decode_assoc_response(p).map(MgmtBody::AssocResponse),
        MgmtSubtype::ReassocResponse => decode_assoc_response(p).map(MgmtBody::ReassocResponse),
        MgmtSubtype::ProbeRequest => decode_probe_request(p).map(MgmtBody::ProbeRequest),
        MgmtSubtype::ProbeResponse => decode_beacon(p).map(MgmtBody::ProbeResponse),
        MgmtSubtype::Beacon => decode_beacon(p).map(MgmtBody::Beacon),
        MgmtSubtype::Authentication => decode_authentication(p).map(MgmtBody::Authentication),
        MgmtSubtype::Deauthentication => decode_disconnect(p).map(MgmtBody::Deauthentication),
        MgmtSubtype::Disassociation => decode_disconnect(p).map(MgmtBody::Disassociation),
        MgmtSubtype::Action | MgmtSubtype::ActionNoAck => decode_action(p).map(MgmtBody::Action),
    }
}

// ── Per-body encode helpers ───────────────────────────────────────────────────

fn encode_authentication(buf: &mut Vec<u8>, m: &Authentication) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&(m.algorithm as u16).to_le_bytes());
    buf.extend_from_slice(&m.transaction_seq.to_le_bytes());
    buf.extend_from_slice(&m.status.0.to_le_bytes());
    if let Some(challenge) = &m.challenge {
        ie::write_element(buf, id::CHALLENGE_TEXT, challenge)?;
    }
    buf.extend_from_slice(&m.elements);
    Ok(())
}

fn encode_assoc_request(buf: &mut Vec<u8>, m: &AssocRequest) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&m.capability.0.to_le_bytes());
    buf.extend_from_slice(&m.listen_interval.to_le_bytes());
    if let Some(current_ap) = &m.current_ap {
        buf.extend_from_slice(&current_ap.0);
    }
    ie::write_element(buf, id::SSID, &m.ssid)?;
    ie::write_rates(buf, &m.rates)?;
    if let Some(rsn) = &m.rsn {
        ie::write_element(buf, id::RSN, rsn)?;
    }
    write_ht_cap(buf, m.ht_cap.as_ref())?;
    if let Some(mde) = &m.mde {
        ie::write_element(buf, id::MOBILITY_DOMAIN, &mde.to_bytes())?;
    }
    if let Some(fte) = &m.fte {
        ie::write_element(buf, id::FAST_BSS_TRANSITION, fte)?;
    }
    if let Some(ext_cap) = &m.ext_cap {
        ie::write_element(buf, id::EXT_CAPABILITIES, ext_cap)?;
    }
    write_vht_cap(buf, m.vht_cap.as_ref())?;
    write_he_cap(buf, m.he_cap.as_ref())?;
    write_wpa(buf, m.wpa.as_deref())?;
    write_vendor(buf, &m.vendor)
}

fn encode_assoc_response(buf: &mut Vec<u8>, m: &AssocResponse) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&m.capability.0.to_le_bytes());
    buf.extend_from_slice(&m.status.0.to_le_bytes());
    buf.extend_from_slice(&(m.aid | AID_WIRE_BITS).to_le_bytes());
    ie::write_rates(buf, &m.rates)?;
    if let Some(erp) = &m.erp {
        ie::write_element(buf, id::ERP, &[erp.0])?;
    }
    write_ht_cap(buf, m.ht_cap.as_ref())?;
    if let Some(ht_op) = &m.ht_op {
        let mut body = Vec::with_capacity(HtOperation::LEN);
        ht_op.write_body(&mut body);
        ie::write_element(buf, id::HT_OPERATION, &body)?;
    }
    if let Some(mde) = &m.mde {
        ie::write_element(buf, id::MOBILITY_DOMAIN, &mde.to_bytes())?;
    }
    if let Some(fte) = &m.fte {
        ie::write_element(buf, id::FAST_BSS_TRANSITION, fte)?;
    }
    write_vht_cap(buf, m.vht_cap.as_ref())?;
    write_he_cap(buf, m.he_cap.as_ref())?;
    write_vendor(buf, &m.vendor)
}

fn encode_probe_request(buf: &mut Vec<u8>, m: &ProbeRequest) -> Result<(), ProtocolError> {
    ie::write_element(buf, id::SSID, &m.ssid)?;
    ie::write_rates(buf, &m.rates)?;
    write_ht_cap(buf, m.ht_cap.as_ref())?;
    write_vht_cap(buf, m.vht_cap.as_ref())?;
    write_he_cap(buf, m.he_cap.as_ref())?;
    write_vendor(buf, &m.vendor)
}

fn encode_beacon(buf: &mut Vec<u8>, m: &BeaconBody) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&m.timestamp.to_le_bytes());
    buf.extend_from_slice(&m.beacon_interval.to_le_bytes());
    buf.extend_from_slice(&m.capability.0.to_le_bytes());
    ie::write_element(buf, id::SSID, &m.ssid)?;
    ie::write_rates(buf, &m.rates)?;
    if let Some(channel) = m.channel {
        ie::write_element(buf, id::DS_PARAMS, &[channel])?;
    }
    if let Some(erp) = &m.erp {
        ie::write_element(buf, id::ERP, &[erp.0])?;
    }
    if let Some(rsn) = &m.rsn {
        ie::write_element(buf, id::RSN, rsn)?;
    }
    write_ht_cap(buf, m.ht_cap.as_ref())?;
    if let Some(ht_op) = &m.ht_op {
        let mut body = Vec::with_capacity(HtOperation::LEN);
        ht_op.write_body(&mut body);
        ie::write_element(buf, id::HT_OPERATION, &body)?;
    }
    if let Some(mde) = &m.mde {
        ie::write_element(buf, id::MOBILITY_DOMAIN, &mde.to_bytes())?;
    }
    write_vht_cap(buf, m.vht_cap.as_ref())?;
    write_he_cap(buf, m.he_cap.as_ref())?;
    write_wpa(buf, m.wpa.as_deref())?;
    write_vendor(buf, &m.vendor)
}

fn encode_disconnect(buf: &mut Vec<u8>, m: &Disconnect) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&m.reason.0.to_le_bytes());
    write_vendor(buf, &m.vendor)
}

fn encode_action(buf: &mut Vec<u8>, m: &ActionFrame) -> Result<(), ProtocolError> {
    let (category, action) = m.code();
    buf.push(category);
    buf.push(action);
    match m {
        ActionFrame::AddtsRequest { dialog_token, tspec } => {
            buf.push(*dialog_token);
            ie::write_element(buf, TSPEC_ELEMENT, tspec)?;
        }
        ActionFrame::AddtsResponse {
            dialog_token,
            status,
            tspec,
        } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(&status.0.to_le_bytes());
            ie::write_element(buf, TSPEC_ELEMENT, tspec)?;
        }
        ActionFrame::Delts { ts_info, reason } => {
            buf.extend_from_slice(ts_info);
            buf.extend_from_slice(&reason.0.to_le_bytes());
        }
        ActionFrame::ChannelSwitch(csa) => {
            ie::write_element(buf, id::CHANNEL_SWITCH, &csa.to_bytes())?;
        }
        ActionFrame::ExtChannelSwitch(ecsa) => buf.extend_from_slice(&ecsa.to_bytes()),
        ActionFrame::RadioMeasurementReport { dialog_token, elements } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(elements);
        }
        ActionFrame::LinkMeasurementReport {
            dialog_token,
            tx_power,
            link_margin,
            rx_antenna,
            tx_antenna,
            rcpi,
            rsni,
        } => {
            buf.push(*dialog_token);
            ie::write_element(buf, TPC_REPORT_ELEMENT, &[*tx_power as u8, *link_margin as u8])?;
            buf.extend_from_slice(&[*rx_antenna, *tx_antenna, *rcpi, *rsni]);
        }
        ActionFrame::NeighborReportRequest { dialog_token, ssid } => {
            buf.push(*dialog_token);
            if let Some(ssid) = ssid {
                ie::write_element(buf, id::SSID, ssid)?;
            }
        }
        ActionFrame::NeighborReportResponse { dialog_token, elements } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(elements);
        }
        ActionFrame::SaQueryRequest { transaction_id } | ActionFrame::SaQueryResponse { transaction_id } => {
            buf.extend_from_slice(&transaction_id.to_le_bytes());
        }
        ActionFrame::AddbaRequest {
            dialog_token,
            parameters,
            timeout,
            starting_sequence,
        } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(&parameters.to_le_bytes());
            buf.extend_from_slice(&timeout.to_le_bytes());
            buf.extend_from_slice(&(starting_sequence << 4).to_le_bytes());
        }
        ActionFrame::AddbaResponse {
            dialog_token,
            status,
            parameters,
            timeout,
        } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(&status.0.to_le_bytes());
            buf.extend_from_slice(&parameters.to_le_bytes());
            buf.extend_from_slice(&timeout.to_le_bytes());
        }
        ActionFrame::Delba { parameters, reason } => {
            buf.extend_from_slice(&parameters.to_le_bytes());
            buf.extend_from_slice(&reason.0.to_le_bytes());
        }
        ActionFrame::MscsRequest { dialog_token, descriptor } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(descriptor);
        }
        ActionFrame::MscsResponse {
            dialog_token,
            status,
            descriptor,
        } => {
            buf.push(*dialog_token);
            buf.extend_from_slice(&status.0.to_le_bytes());
            buf.extend_from_slice(descriptor);
        }
        ActionFrame::Other { body, .. } => buf.extend_from_slice(body),
    }
    Ok(())
}

fn write_ht_cap(buf: &mut Vec<u8>, ht: Option<&HtCapabilities>) -> Result<(), ProtocolError> {
    if let Some(ht) = ht {
        let mut body = Vec::with_capacity(HtCapabilities::LEN);
        ht.write_body(&mut body);
        ie::write_element(buf, id::HT_CAPABILITIES, &body)?;
    }
    Ok(())
}

fn write_vht_cap(buf: &mut Vec<u8>, vht: Option<&VhtCapabilities>) -> Result<(), ProtocolError> {
    if let Some(vht) = vht {
        let mut body = Vec::with_capacity(VhtCapabilities::LEN);
        vht.write_body(&mut body);
        ie::write_element(buf, id::VHT_CAPABILITIES, &body)?;
    }
    Ok(())
}

fn write_he_cap(buf: &mut Vec<u8>, he: Option<&HeCapabilities>) -> Result<(), ProtocolError> {
    if let Some(he) = he {
        let mut body = Vec::new();
        he.write_body(&mut body);
        ie::write_ext_element(buf, ext_id::HE_CAPABILITIES, &body)?;
    }
    Ok(())
}

fn write_wpa(buf: &mut Vec<u8>, wpa: Option<&[u8]>) -> Result<(), ProtocolError> {
    if let Some(wpa) = wpa {
        VendorIe::new(WPA_OUI, WPA_OUI_TYPE, wpa.to_vec()).write(buf)?;
    }
    Ok(())
}

fn write_vendor(buf: &mut Vec<u8>, vendor: &[VendorIe]) -> Result<(), ProtocolError> {
    for ie in vendor {
        ie.write(buf)?;
    }
    Ok(())
}

// ── Per-body decode helpers ───────────────────────────────────────────────────

/// Everything the MLME extracts from an element list, in one pass.
#[derive(Default)]
struct ParsedElements {
    ssid: Option<Vec<u8>>,
    rates: Vec<u8>,
    channel: Option<u8>,
    erp: Option<ErpInfo>,
    ht_cap: Option<HtCapabilities>,
    ht_op: Option<HtOperation>,
    vht_cap: Option<VhtCapabilities>,
    he_cap: Option<HeCapabilities>,
    rsn: Option<Vec<u8>>,
    wpa: Option<Vec<u8>>,
    mde: Option<MobilityDomain>,
    fte: Option<Vec<u8>>,
    ext_cap: Option<Vec<u8>>,
    vendor: Vec<VendorIe>,
}

fn parse_elements(bytes: &[u8]) -> Result<ParsedElements, ProtocolError> {
    let mut out = ParsedElements::default();
    for element in IeReader::new(bytes) {
        let element = element?;
        let body = element.body;
        match element.id {
            id::SSID => out.ssid = Some(body.to_vec()),
            id::SUPPORTED_RATES | id::EXT_SUPPORTED_RATES => out.rates.extend_from_slice(body),
            id::DS_PARAMS => out.channel = body.first().copied(),
            id::ERP => out.erp = Some(ErpInfo::parse(body)?),
            id::HT_CAPABILITIES => out.ht_cap = Some(HtCapabilities::parse(body)?),
            id::HT_OPERATION => out.ht_op = Some(HtOperation::parse(body)?),
            id::VHT_CAPABILITIES => out.vht_cap = Some(VhtCapabilities::parse(body)?),
            id::RSN => out.rsn = Some(body.to_vec()),
            id::MOBILITY_DOMAIN => out.mde = Some(MobilityDomain::parse(body)?),
            id::FAST_BSS_TRANSITION => out.fte = Some(body.to_vec()),
            id::EXT_CAPABILITIES => out.ext_cap = Some(body.to_vec()),
            id::EXTENSION => {
                if body.first() == Some(&ext_id::HE_CAPABILITIES) {
                    out.he_cap = Some(HeCapabilities::parse(&body[1..])?);
                }
            }
            id::VENDOR_SPECIFIC => {
                let vendor = VendorIe::parse(body)?;
                if vendor.is_wpa() {
                    out.wpa = Some(vendor.body);
                } else {
                    out.vendor.push(vendor);
                }
            }
            _ => {}
        }
    }
    Ok(out)
}

fn decode_authentication(p: &[u8]) -> Result<Authentication, ProtocolError> {
    require_len(p, 6, "Authentication")?;
    let algorithm_raw = read_u16(p, 0)?;
    let algorithm =
        AuthAlgorithm::try_from(algorithm_raw).map_err(|_| ProtocolError::UnknownAuthAlgorithm(algorithm_raw))?;
    let transaction_seq = read_u16(p, 2)?;
    let status = StatusCode(read_u16(p, 4)?);
    let mut rest = &p[6..];
    let mut challenge = None;
    if algorithm == AuthAlgorithm::SharedKey && rest.first() == Some(&id::CHALLENGE_TEXT) {
        let element = IeReader::new(rest).next().transpose()?.ok_or_else(|| {
            ProtocolError::MalformedBody("Authentication: challenge text missing".to_string())
        })?;
        challenge = Some(element.body.to_vec());
        rest = &rest[2 + element.body.len()..];
    }
    Ok(Authentication {
        algorithm,
        transaction_seq,
        status,
        challenge,
        elements: rest.to_vec(),
    })
}

fn decode_assoc_request(p: &[u8], reassoc: bool) -> Result<AssocRequest, ProtocolError> {
    let fixed = if reassoc { 10 } else { 4 };
    require_len(p, fixed, "AssocRequest")?;
    let capability = CapabilityInfo(read_u16(p, 0)?);
    let listen_interval = read_u16(p, 2)?;
    let current_ap = if reassoc { Some(read_addr(p, 4)?) } else { None };
    let e = parse_elements(&p[fixed..])?;
    Ok(AssocRequest {
        capability,
        listen_interval,
        current_ap,
        ssid: e.ssid.unwrap_or_default(),
        rates: e.rates,
        ht_cap: e.ht_cap,
        vht_cap: e.vht_cap,
        he_cap: e.he_cap,
        rsn: e.rsn,
        wpa: e.wpa,
        mde: e.mde,
        fte: e.fte,
        ext_cap: e.ext_cap,
        vendor: e.vendor,
    })
}

fn decode_assoc_response(p: &[u8]) -> Result<AssocResponse, ProtocolError> {
    require_len(p, 6, "AssocResponse")?;
    let capability = CapabilityInfo(read_u16(p, 0)?);
    let status = StatusCode(read_u16(p, 2)?);
    let aid = read_u16(p, 4)? & !AID_WIRE_BITS;
    let e = parse_elements(&p[6..])?;
    Ok(AssocResponse {
        capability,
        status,
        aid,
        rates: e.rates,
        ht_cap: e.ht_cap,
        ht_op: e.ht_op,
        vht_cap: e.vht_cap,
        he_cap: e.he_cap,
        erp: e.erp,
        mde: e.mde,
        fte: e.fte,
        vendor: e.vendor,
    })
}

fn decode_probe_request(p: &[u8]) -> Result<ProbeRequest, ProtocolError> {
    let e = parse_elements(p)?;
    Ok(ProbeRequest {
        ssid: e.ssid.unwrap_or_default(),
        rates: e.rates,
        ht_cap: e.ht_cap,
        vht_cap: e.vht_cap,
        he_cap: e.he_cap,
        vendor: e.vendor,
    })
}

fn decode_beacon(p: &[u8]) -> Result<BeaconBody, ProtocolError> {
    require_len(p, 12, "Beacon")?;
    let timestamp = read_u64(p, 0)?;
    let beacon_interval = read_u16(p, 8)?;
    let capability = CapabilityInfo(read_u16(p, 10)?);
    let e = parse_elements(&p[12..])?;
    Ok(BeaconBody {
        timestamp,
        beacon_interval,
        capability,
        ssid: e.ssid.unwrap_or_default(),
        rates: e.rates,
        channel: e.channel,
        erp: e.erp,
        ht_cap: e.ht_cap,
        ht_op: e.ht_op,
        vht_cap: e.vht_cap,
        he_cap: e.he_cap,
        rsn: e.rsn,
        wpa: e.wpa,
        mde: e.mde,
        vendor: e.vendor,
    })
}

fn decode_disconnect(p: &[u8]) -> Result<Disconnect, ProtocolError> {
    require_len(p, 2, "Disconnect")?;
    let reason = ReasonCode(read_u16(p, 0)?);
    let e = parse_elements(&p[2..])?;
    Ok(Disconnect {
        reason,
        vendor: e.vendor,
    })
}

fn decode_action(p: &[u8]) -> Result<ActionFrame, ProtocolError> {
    require_len(p, 2, "Action")?;
    let (cat, action) = (p[0], p[1]);
    let b = &p[2..];
    let frame = match (cat, action) {
        (category::QOS, 0) => {
            require_len(b, 1, "ADDTS request")?;
            ActionFrame::AddtsRequest {
                dialog_token: b[0],
                tspec: element_body(&b[1..], TSPEC_ELEMENT)?,
            }
        }
        (category::QOS, 1) => {
            require_len(b, 3, "ADDTS response")?;
            ActionFrame::AddtsResponse {
                dialog_token: b[0],
                status: StatusCode(read_u16(b, 1)?),
                tspec: element_body(&b[3..], TSPEC_ELEMENT)?,
            }
        }
        (category::QOS, 2) => {
            require_len(b, 5, "DELTS")?;
            ActionFrame::Delts {
                ts_info: [b[0], b[1], b[2]],
                reason: ReasonCode(read_u16(b, 3)?),
            }
        }
        (category::SPECTRUM_MGMT, 4) => {
            let body = element_body(b, id::CHANNEL_SWITCH)?;
            ActionFrame::ChannelSwitch(ChannelSwitchAnnouncement::parse(&body)?)
        }
        (category::PUBLIC, 4) => ActionFrame::ExtChannelSwitch(ExtChannelSwitchAnnouncement::parse(b)?),
        (category::RADIO_MEASUREMENT, 1) => {
            require_len(b, 1, "radio measurement report")?;
            ActionFrame::RadioMeasurementReport {
                dialog_token: b[0],
                elements: b[1..].to_vec(),
            }
        }
        (category::RADIO_MEASUREMENT, 3) => {
            require_len(b, 9, "link measurement report")?;
            let tpc = element_body(&b[1..5], TPC_REPORT_ELEMENT)?;
            require_len(&tpc, 2, "TPC report")?;
            ActionFrame::LinkMeasurementReport {
                dialog_token: b[0],
                tx_power: tpc[0] as i8,
                link_margin: tpc[1] as i8,
                rx_antenna: b[5],
                tx_antenna: b[6],
                rcpi: b[7],
                rsni: b[8],
            }
        }
        (category::RADIO_MEASUREMENT, 4) => {
            require_len(b, 1, "neighbor report request")?;
            let ssid = parse_elements(&b[1..])?.ssid;
            ActionFrame::NeighborReportRequest {
                dialog_token: b[0],
                ssid,
            }
        }
        (category::RADIO_MEASUREMENT, 5) => {
            require_len(b, 1, "neighbor report response")?;
            ActionFrame::NeighborReportResponse {
                dialog_token: b[0],
                elements: b[1..].to_vec(),
            }
        }
        (category::SA_QUERY, 0) => ActionFrame::SaQueryRequest {
            transaction_id: read_u16(b, 0)?,
        },
        (category::SA_QUERY, 1) => ActionFrame::SaQueryResponse {
            transaction_id: read_u16(b, 0)?,
        },
        (category::BLOCK_ACK, 0) => {
            require_len(b, 7, "ADDBA request")?;
            ActionFrame::AddbaRequest {
                dialog_token: b[0],
                parameters: read_u16(b, 1)?,
                timeout: read_u16(b, 3)?,
                starting_sequence: read_u16(b, 5)? >> 4,
            }
        }
        (category::BLOCK_ACK, 1) => {
            require_len(b, 7, "ADDBA response")?;
            ActionFrame::AddbaResponse {
                dialog_token: b[0],
                status: StatusCode(read_u16(b, 1)?),
                parameters: read_u16(b, 3)?,
                timeout: read_u16(b, 5)?,
            }
        }
        (category::BLOCK_ACK, 2) => ActionFrame::Delba {
            parameters: read_u16(b, 0)?,
            reason: ReasonCode(read_u16(b, 2)?),
        },
        (category::ROBUST_AV_STREAMING, 4) => {
            require_len(b, 1, "MSCS request")?;
            ActionFrame::MscsRequest {
                dialog_token: b[0],
                descriptor: b[1..].to_vec(),
            }
        }
        (category::ROBUST_AV_STREAMING, 5) => {
            require_len(b, 3, "MSCS response")?;
            ActionFrame::MscsResponse {
                dialog_token: b[0],
                status: StatusCode(read_u16(b, 1)?),
                descriptor: b[3..].to_vec(),
            }
        }
        (category, action) => ActionFrame::Other {
            category,
            action,
            body: b.to_vec(),
        },
    };
    Ok(frame)
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedBody(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Result<u16, ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 2,
            available: buf.len(),
        });
    }
    Ok(u16::from_le_bytes([buf[offset], buf[offset + 1]]))
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    if buf.len() < offset + 8 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    let mut octets = [0u8; 8];
    octets.copy_from_slice(&buf[offset..offset + 8]);
    Ok(u64::from_le_bytes(octets))
}

fn read_addr(buf: &[u8], offset: usize) -> Result<MacAddr, ProtocolError> {
    if buf.len() < offset + 6 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 6,
            available: buf.len(),
        });
    }
    let mut octets = [0u8; 6];
    octets.copy_from_slice(&buf[offset..offset + 6]);
    Ok(MacAddr(octets))
}

/// Returns the body of the first element in `bytes`, which must carry `want`.
fn element_body(bytes: &[u8], want: u8) -> Result<Vec<u8>, ProtocolError> {
    match IeReader::new(bytes).next() {
        Some(Ok(element)) if element.id == want => Ok(element.body.to_vec()),
        Some(Ok(element)) => Err(ProtocolError::MalformedElement {
            id: element.id,
            reason: format!("expected element {want}"),
        }),
        Some(Err(e)) => Err(e),
        None => Err(ProtocolError::MalformedElement {
            id: want,
            reason: "missing".to_string(),
        }),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
