//! Integration tests for the wlan-mlme-core frame codec.
//!
//! These tests build frames the way the engine does (capability sets,
//! sequence counter, WEP for shared-key frame 3) and verify that decoding
//! through the public API recovers what was built.

use wlan_mlme_core::domain::capabilities::CapabilitySet;
use wlan_mlme_core::protocol::frames::{
    ActionFrame, AssocRequest, AuthAlgorithm, Authentication, CapabilityInfo, Disconnect, MgmtBody,
    MgmtFrame, ReasonCode, StatusCode,
};
use wlan_mlme_core::protocol::ie::{HeCapabilities, HtCapabilities, MobilityDomain, VendorIe, VhtCapabilities};
use wlan_mlme_core::protocol::{decode_body, decode_frame, encode_body, encode_frame, wep, MacAddr, SequenceCounter};
use wlan_mlme_core::{MgmtSubtype, ProtocolError};

const AP: MacAddr = MacAddr([0xaa, 0xbb, 0xcc, 0x00, 0x00, 0x01]);
const STA: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x07]);

fn station_caps() -> CapabilitySet {
    let mut mcs_set = [0u8; 16];
    mcs_set[0] = 0xff;
    mcs_set[1] = 0xff;
    CapabilitySet {
        capability: CapabilityInfo(CapabilityInfo::ESS | CapabilityInfo::QOS | CapabilityInfo::SHORT_SLOT_TIME),
        rates: vec![0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24, 0x30, 0x48, 0x60, 0x6c],
        ht: Some(HtCapabilities {
            cap_info: HtCapabilities::CHAN_WIDTH_40 | HtCapabilities::SHORT_GI_20 | HtCapabilities::SHORT_GI_40,
            ampdu_params: 0x17,
            mcs_set,
            ..Default::default()
        }),
        vht: Some(VhtCapabilities {
            info: 0x0380_01b2,
            rx_mcs_map: 0xfffa,
            rx_highest_rate: 0,
            tx_mcs_map: 0xfffa,
            tx_highest_rate: 0,
        }),
        he: Some(HeCapabilities {
            mac_info: [0x01, 0x08, 0, 0, 0, 0],
            phy_info: [0x02, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
            mcs_nss: vec![0xfa, 0xff, 0xfa, 0xff],
            ppe_thresholds: vec![],
        }),
    }
}

fn ap_caps() -> CapabilitySet {
    let mut caps = station_caps();
    caps.rates = vec![0x82, 0x84, 0x0c, 0x18, 0x30];
    caps.he = None;
    caps
}

fn assoc_request_from(caps: &CapabilitySet) -> AssocRequest {
    AssocRequest {
        capability: caps.capability,
        listen_interval: 10,
        ssid: b"lab-net".to_vec(),
        rates: caps.rates.clone(),
        ht_cap: caps.ht,
        vht_cap: caps.vht,
        he_cap: caps.he.clone(),
        rsn: Some(vec![0x01, 0x00, 0x00, 0x0f, 0xac, 0x04]),
        ..Default::default()
    }
}

#[test]
fn test_assoc_request_roundtrip_reproduces_phy_subset() {
    // Arrange
    let negotiated = station_caps().intersect(&ap_caps());
    let frame = MgmtFrame::new(AP, STA, AP, MgmtBody::AssocRequest(assoc_request_from(&negotiated)));

    // Act
    let bytes = encode_frame(&frame).expect("encode");
    let decoded = decode_frame(&bytes).expect("decode");

    // Assert
    let MgmtBody::AssocRequest(req) = decoded.body else {
        panic!("expected an association request");
    };
    let recovered = CapabilitySet::from_assoc_request(&req);
    assert_eq!(recovered.ht, negotiated.ht);
    assert_eq!(recovered.vht, negotiated.vht);
    assert_eq!(recovered.he, negotiated.he);
    assert!(recovered.he.is_none(), "AP lacks HE so the subset drops it");
    assert_eq!(recovered.rates, negotiated.rates);
}

#[test]
fn test_reassoc_request_with_ft_elements_roundtrip() {
    // Arrange
    let mut req = assoc_request_from(&station_caps());
    req.current_ap = Some(MacAddr([0xaa, 0xbb, 0xcc, 0, 0, 0x02]));
    req.mde = Some(MobilityDomain {
        mdid: [0x12, 0x34],
        ft_capability: MobilityDomain::FT_OVER_DS,
    });
    req.fte = Some(vec![0u8; 82]);
    req.vendor = vec![VendorIe::new([0x00, 0x10, 0x18], 2, vec![1, 2, 3])];
    let frame = MgmtFrame::new(AP, STA, AP, MgmtBody::ReassocRequest(req));

    // Act
    let decoded = decode_frame(&encode_frame(&frame).expect("encode")).expect("decode");

    // Assert
    assert_eq!(decoded, frame);
}

#[test]
fn test_sequence_numbers_flow_through_header() {
    let counter = SequenceCounter::starting_at(4094);
    let mut seen = Vec::new();
    for _ in 0..3 {
        let mut frame = MgmtFrame::new(
            AP,
            STA,
            AP,
            MgmtBody::Deauthentication(Disconnect::new(ReasonCode::LEAVING_NETWORK_DEAUTH)),
        );
        frame.header.sequence = counter.next();
        let decoded = decode_frame(&encode_frame(&frame).expect("encode")).expect("decode");
        seen.push(decoded.header.sequence);
    }
    assert_eq!(seen, vec![4094, 4095, 0]);
}

#[test]
fn test_shared_key_frame3_survives_wep_roundtrip() {
    // Arrange
    let key = b"\x01\x02\x03\x04\x05";
    let mut auth = Authentication::new(AuthAlgorithm::SharedKey, 3, StatusCode::SUCCESS);
    auth.challenge = Some((0..128).map(|i| i as u8).collect());
    let plaintext = encode_body(&MgmtBody::Authentication(auth.clone())).expect("encode body");
    let mut frame = MgmtFrame::new(
        AP,
        STA,
        AP,
        MgmtBody::Encrypted {
            subtype: MgmtSubtype::Authentication,
            bytes: wep::encrypt(key, 0, wep::iv_from_counter(7), &plaintext).expect("encrypt"),
        },
    );
    frame.header.protected = true;

    // Act
    let decoded = decode_frame(&encode_frame(&frame).expect("encode")).expect("decode");
    let MgmtBody::Encrypted { subtype, bytes } = decoded.body else {
        panic!("protected frames decode as Encrypted");
    };
    let clear = wep::decrypt(key, &bytes).expect("decrypt");

    // Assert
    assert_eq!(decode_body(subtype, &clear).expect("body"), MgmtBody::Authentication(auth));
}

#[test]
fn test_action_frames_roundtrip() {
    let actions = [
        ActionFrame::SaQueryRequest { transaction_id: 0xbeef },
        ActionFrame::AddbaRequest {
            dialog_token: 1,
            parameters: 0x1002,
            timeout: 0,
            starting_sequence: 0x0010,
        },
        ActionFrame::NeighborReportRequest {
            dialog_token: 9,
            ssid: Some(b"lab-net".to_vec()),
        },
    ];
    for action in actions {
        let frame = MgmtFrame::new(AP, STA, AP, MgmtBody::Action(action));
        let decoded = decode_frame(&encode_frame(&frame).expect("encode")).expect("decode");
        assert_eq!(decoded, frame);
    }
}

#[test]
fn test_every_truncation_of_a_valid_frame_is_an_error_not_a_panic() {
    let frame = MgmtFrame::new(AP, STA, AP, MgmtBody::AssocRequest(assoc_request_from(&station_caps())));
    let bytes = encode_frame(&frame).expect("encode");
    for len in 0..bytes.len() {
        // Any outcome is acceptable except a panic.
        let _ = decode_frame(&bytes[..len]);
    }
    assert!(matches!(
        decode_frame(&bytes[..10]),
        Err(ProtocolError::InsufficientData { .. })
    ));
}
