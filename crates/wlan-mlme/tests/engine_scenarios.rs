//! Integration tests for the MLME engine's connection flows.
//!
//! These tests drive `MlmeContext` through its *public* API only, exactly as
//! the event loop does: every input is an `MlmeEvent`, and every observation
//! is made through the recording adapters (`RecordingRadio`,
//! `ManualScheduler`, `RecordingScan`, `RecordingUpstream`, `ManualClock`)
//! or the read-only session accessors.
//!
//! # Scenarios covered
//!
//! - Starting the same BSS twice keeps one session.
//! - Authentication frame 1 retries: N no-acks give N resends, then one
//!   failure confirmation.
//! - SAE frames follow the same rule and leave no timer behind.
//! - A legacy (11b-only) station switches ERP protection on and off.
//! - A full pre-authentication registry reclaims stale open-system nodes.
//! - A fast BSS transition from AP1 to AP2 end to end.

use std::sync::Arc;

use wlan_mlme::application::context::{EngineConfig, MlmeContext, Ports};
use wlan_mlme::application::events::{JoinParams, MlmeEvent, ScanEvent, SmeRequest, StartBssParams};
use wlan_mlme::application::tx_pipeline::{TxClass, TxStatus};
use wlan_mlme::application::upstream::{MlmeIndication, ResultCode};
use wlan_mlme::infrastructure::clock::ManualClock;
use wlan_mlme::infrastructure::radio::mock::RecordingRadio;
use wlan_mlme::infrastructure::scan::RecordingScan;
use wlan_mlme::infrastructure::timer::ManualScheduler;
use wlan_mlme::infrastructure::upstream::RecordingUpstream;
use wlan_mlme_core::domain::protection::Category;
use wlan_mlme_core::domain::session::SecurityMaterial;
use wlan_mlme_core::protocol::frames::{
    AssocRequest, AssocResponse, AuthAlgorithm, Authentication, BeaconBody, CapabilityInfo, Disconnect, ReasonCode,
    StatusCode,
};
use wlan_mlme_core::protocol::ie::{self, id, MobilityDomain};
use wlan_mlme_core::{decode_frame, encode_frame, CapabilitySet, MacAddr, MgmtBody, MgmtFrame, MlmState, Role, SessionRef};

const AP1: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0x01]);
const AP2: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0x02]);
const STA: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);
const RATES: [u8; 8] = [0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24];

// ── Harness ───────────────────────────────────────────────────────────────────

struct Harness {
    ctx: MlmeContext,
    radio: Arc<RecordingRadio>,
    scan: Arc<RecordingScan>,
    upstream: Arc<RecordingUpstream>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(config: EngineConfig) -> Self {
        let radio = Arc::new(RecordingRadio::new());
        let scan = Arc::new(RecordingScan::new());
        let upstream = Arc::new(RecordingUpstream::new());
        let clock = Arc::new(ManualClock::new(0));
        let ports = Ports {
            radio: radio.clone(),
            timers: Arc::new(ManualScheduler::new()),
            scan: scan.clone(),
            upstream: upstream.clone(),
            clock: clock.clone(),
        };
        Self {
            ctx: MlmeContext::new(config, ports),
            radio,
            scan,
            upstream,
            clock,
        }
    }

    fn sme(&mut self, request: SmeRequest) {
        self.ctx.handle_event(MlmeEvent::Sme(request));
    }

    fn rx(&mut self, frame: MgmtFrame) {
        let bytes = encode_frame(&frame).expect("test frame encodes");
        self.ctx.handle_event(MlmeEvent::RxFrame { vdev_id: 0, bytes });
    }

    fn complete_last(&mut self, status: TxStatus) {
        let request = self.radio.sent().pop().expect("a frame was sent");
        self.ctx.handle_event(MlmeEvent::TxComplete {
            token: request.token,
            status,
            buffer: request.buffer,
        });
    }

    fn session(&self, bssid: MacAddr) -> Option<SessionRef> {
        self.ctx.sessions().find_by_bssid(&bssid)
    }

    fn mlm(&self, sref: SessionRef) -> Option<MlmState> {
        self.ctx.sessions().get(sref).map(|s| s.mlm_state())
    }

    fn last_body(&self) -> Option<MgmtBody> {
        let request = self.radio.sent().pop()?;
        decode_frame(request.buffer.as_slice()).ok().map(|f| f.body)
    }
}

fn caps() -> CapabilitySet {
    CapabilitySet {
        rates: RATES.to_vec(),
        ..CapabilitySet::default()
    }
}

fn join(bssid: MacAddr) -> JoinParams {
    JoinParams {
        vdev_id: 0,
        self_mac: STA,
        bssid,
        ssid: b"lab".to_vec(),
        channel: 6,
        ch_width_40: false,
        role: Role::Sta,
        caps: caps(),
        auth_algorithm: AuthAlgorithm::OpenSystem,
        security: SecurityMaterial::default(),
        beacon: Some(BeaconBody {
            beacon_interval: 100,
            capability: CapabilityInfo(CapabilityInfo::ESS),
            ssid: b"lab".to_vec(),
            rates: RATES.to_vec(),
            channel: Some(6),
            ..BeaconBody::default()
        }),
        listen_interval: 0,
    }
}

fn start_bss(bssid: MacAddr, max_peers: usize) -> StartBssParams {
    StartBssParams {
        vdev_id: 0,
        self_mac: bssid,
        bssid,
        ssid: b"lab".to_vec(),
        channel: 6,
        ch_width_40: false,
        beacon_interval: 100,
        role: Role::Ap,
        caps: caps(),
        security: SecurityMaterial::default(),
        max_peers,
        rifs_permitted: false,
        noa: None,
    }
}

fn station(n: u8) -> MacAddr {
    MacAddr([0x02, 0, 0, 0, 0x20, n])
}

/// A frame from `sa` addressed to `bssid`.
fn frame(da: MacAddr, sa: MacAddr, bssid: MacAddr, body: MgmtBody) -> MgmtFrame {
    MgmtFrame::new(da, sa, bssid, body)
}

fn open_auth(n: u16) -> MgmtBody {
    MgmtBody::Authentication(Authentication::new(AuthAlgorithm::OpenSystem, n, StatusCode::SUCCESS))
}

// ── Session pool ──────────────────────────────────────────────────────────────

#[test]
fn test_start_bss_twice_for_same_bssid_keeps_one_session() {
    // Arrange
    let mut h = Harness::new(EngineConfig::default());

    // Act
    h.sme(SmeRequest::StartBss(start_bss(AP1, 8)));
    let first = h.session(AP1).expect("session created");
    let first_id = h.ctx.sessions().get(first).map(|s| s.id());
    h.sme(SmeRequest::StartBss(start_bss(AP1, 8)));

    // Assert
    assert_eq!(h.session(AP1), Some(first));
    assert_eq!(h.ctx.sessions().get(first).map(|s| s.id()), first_id);
    assert_eq!(h.ctx.sessions().active_count(), 1);
}

// ── Transmit retry ────────────────────────────────────────────────────────────

#[test]
fn test_auth1_no_acks_give_exactly_limit_resends_then_one_failure() {
    // Arrange
    let mut h = Harness::new(EngineConfig {
        auth_retry_limit: 2,
        ..EngineConfig::default()
    });
    h.sme(SmeRequest::Join(join(AP1)));
    let sref = h.session(AP1).expect("joined");
    assert_eq!(h.mlm(sref), Some(MlmState::WaitAuthFrame2));
    assert_eq!(h.radio.sent().len(), 1, "Authentication frame 1 sent");

    // Act
    for _ in 0..3 {
        h.complete_last(TxStatus::NotAcked);
    }

    // Assert
    let auth_frames = h.radio.sent().iter().filter(|r| r.class == TxClass::Auth).count();
    assert_eq!(auth_frames, 3, "original plus two resends");
    let failures: Vec<_> = h
        .upstream
        .posted()
        .into_iter()
        .filter(|i| matches!(i, MlmeIndication::AuthCnf { .. }))
        .collect();
    assert_eq!(
        failures,
        vec![MlmeIndication::AuthCnf {
            bssid: AP1,
            algorithm: AuthAlgorithm::OpenSystem,
            result: ResultCode::TxFailed,
        }]
    );
    assert_eq!(h.session(AP1), None, "station session torn down");
}

#[test]
fn test_sae_no_acks_end_in_one_failure_and_no_armed_timers() {
    // Arrange
    let mut h = Harness::new(EngineConfig {
        sae_retry_limit: 1,
        ..EngineConfig::default()
    });
    let mut params = join(AP1);
    params.auth_algorithm = AuthAlgorithm::Sae;
    h.sme(SmeRequest::Join(params));
    h.sme(SmeRequest::SendAuthFrame {
        bssid: AP1,
        peer: AP1,
        frame: Authentication::new(AuthAlgorithm::Sae, 1, StatusCode::SUCCESS),
    });

    // Act
    for _ in 0..2 {
        h.complete_last(TxStatus::NotAcked);
    }

    // Assert
    let sae_frames = h.radio.sent().iter().filter(|r| r.class == TxClass::SaeAuth).count();
    assert_eq!(sae_frames, 2, "original plus one resend");
    let failures: Vec<_> = h
        .upstream
        .posted()
        .into_iter()
        .filter(|i| matches!(i, MlmeIndication::AuthCnf { .. }))
        .collect();
    assert_eq!(
        failures,
        vec![MlmeIndication::AuthCnf {
            bssid: AP1,
            algorithm: AuthAlgorithm::Sae,
            result: ResultCode::TxFailed,
        }]
    );
    assert_eq!(h.session(AP1), None);
    assert_eq!(h.ctx.timers().armed_count(), 0, "no timer left to post a second failure");
}

// ── Protection ────────────────────────────────────────────────────────────────

#[test]
fn test_legacy_station_toggles_11b_protection() {
    // Arrange
    let mut h = Harness::new(EngineConfig::default());
    h.sme(SmeRequest::StartBss(start_bss(AP1, 8)));
    let sref = h.session(AP1).expect("bss started");
    let sta = station(1);
    h.rx(frame(AP1, sta, AP1, open_auth(1)));
    let legacy = AssocRequest {
        listen_interval: 10,
        ssid: b"lab".to_vec(),
        rates: vec![0x82, 0x84, 0x8b, 0x96],
        ..AssocRequest::default()
    };
    let own_11b = |h: &Harness| {
        h.ctx
            .sessions()
            .get(sref)
            .map(|s| (s.protection.own_count(Category::Legacy11b), s.protection.flags().llb_coexist))
    };
    assert_eq!(own_11b(&h), Some((0, false)));

    // Act
    h.rx(frame(AP1, sta, AP1, MgmtBody::AssocRequest(legacy)));
    let after_assoc = own_11b(&h);
    h.rx(frame(
        AP1,
        sta,
        AP1,
        MgmtBody::Disassociation(Disconnect::new(ReasonCode::STA_LEAVING)),
    ));
    let after_disassoc = own_11b(&h);

    // Assert
    assert_eq!(after_assoc, Some((1, true)));
    assert_eq!(after_disassoc, Some((0, false)));
    let beacon_changes = h
        .upstream
        .posted()
        .iter()
        .filter(|i| matches!(i, MlmeIndication::BeaconParamsChanged { .. }))
        .count();
    assert!(beacon_changes >= 2, "protection on and off both reach the SME");
}

// ── Pre-authentication registry ───────────────────────────────────────────────

#[test]
fn test_full_registry_reaps_all_stale_open_nodes_for_new_station() {
    // Arrange
    let mut h = Harness::new(EngineConfig {
        preauth_capacity: 4,
        open_auth_timeout_ticks: 1_000,
        ..EngineConfig::default()
    });
    h.sme(SmeRequest::StartBss(start_bss(AP1, 8)));
    let sref = h.session(AP1).expect("bss started");
    for n in 1..=4 {
        h.rx(frame(AP1, station(n), AP1, open_auth(1)));
    }
    let registry_len = |h: &Harness| h.ctx.sessions().get(sref).map(|s| s.preauth.len());
    assert_eq!(registry_len(&h), Some(4));

    // Act
    h.clock.advance(1_001);
    h.rx(frame(AP1, station(5), AP1, open_auth(1)));

    // Assert
    match h.last_body() {
        Some(MgmtBody::Authentication(auth)) => {
            assert_eq!(auth.transaction_seq, 2);
            assert_eq!(auth.status, StatusCode::SUCCESS);
        }
        other => panic!("expected Authentication frame 2, got {other:?}"),
    }
    assert_eq!(registry_len(&h), Some(1));
    let session = h.ctx.sessions().get(sref).expect("session");
    assert!(session.preauth.search(&station(5)).is_some());
    assert!((1..=4).all(|n| session.preauth.search(&station(n)).is_none()));
}

// ── Fast BSS transition ───────────────────────────────────────────────────────

#[test]
fn test_fast_transition_from_ap1_to_ap2() {
    // Arrange: linked to AP1
    let mut h = Harness::new(EngineConfig::default());
    h.sme(SmeRequest::Join(join(AP1)));
    h.rx(frame(STA, AP1, AP1, open_auth(2)));
    let linked = AssocResponse {
        capability: CapabilityInfo(CapabilityInfo::ESS),
        status: StatusCode::SUCCESS,
        aid: 1,
        rates: RATES.to_vec(),
        ..AssocResponse::default()
    };
    h.rx(frame(STA, AP1, AP1, MgmtBody::AssocResponse(linked.clone())));
    let origin = h.session(AP1).expect("origin session");
    assert_eq!(h.mlm(origin), Some(MlmState::LinkEstablished));
    let mde = MobilityDomain {
        mdid: [0x12, 0x34],
        ft_capability: MobilityDomain::FT_OVER_DS,
    };

    // Act 1: pre-authentication request and foreign channel
    h.sme(SmeRequest::FtPreauth {
        bssid: AP1,
        target_bssid: AP2,
        target_channel: 36,
        mde: Some(mde),
        ft_ies: Vec::new(),
    });
    let scan_id = h.scan.last_scan_id().expect("scan requested");
    h.ctx
        .handle_event(MlmeEvent::Scan(ScanEvent::ForeignChannel { scan_id, channel: 36 }));

    // Assert 1: FT Authentication frame 1 on the target channel
    let auth1 = h.radio.sent().pop().expect("auth1 sent");
    assert_eq!(auth1.class, TxClass::FtAuth);
    assert_eq!(auth1.channel, Some(36));

    // Act 2: AP2 answers
    let mut elements = Vec::new();
    ie::write_element(&mut elements, id::MOBILITY_DOMAIN, &mde.to_bytes()).expect("mde");
    let mut auth2 = Authentication::new(AuthAlgorithm::FastTransition, 2, StatusCode::SUCCESS);
    auth2.elements = elements;
    h.rx(frame(STA, AP2, AP2, MgmtBody::Authentication(auth2)));

    // Assert 2: target session created and reassociation queued
    let target = h.session(AP2).expect("target session");
    assert_eq!(h.mlm(target), Some(MlmState::WaitFtReassocRsp));
    assert_eq!(h.radio.sent().pop().map(|r| r.class), Some(TxClass::FtReassoc));
    assert!(matches!(h.last_body(), Some(MgmtBody::ReassocRequest(req)) if req.current_ap == Some(AP1)));

    // Act 3: AP2 accepts the reassociation
    let accepted = AssocResponse { aid: 7, ..linked };
    h.rx(frame(STA, AP2, AP2, MgmtBody::ReassocResponse(accepted)));

    // Assert 3: transition complete, origin gone
    assert_eq!(h.mlm(target), Some(MlmState::Reassociated));
    assert_eq!(h.session(AP1), None);
    assert_eq!(
        h.upstream.last(),
        Some(MlmeIndication::ReassocCnf {
            bssid: AP2,
            aid: 7,
            result: ResultCode::Success,
        })
    );
}
