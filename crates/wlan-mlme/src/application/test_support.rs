//! Shared fixtures for the flow tests in `sta`, `ap` and `ft_handoff`.
//!
//! [`Bed`] wires an [`MlmeContext`] to the recording adapters from
//! `infrastructure` so a test can feed events in and look at what came out.

use std::sync::Arc;

use wlan_mlme_core::domain::session::SecurityMaterial;
use wlan_mlme_core::protocol::frames::{AssocResponse, AuthAlgorithm, Authentication, BeaconBody, CapabilityInfo, StatusCode};
use wlan_mlme_core::protocol::{decode_body, MgmtSubtype};
use wlan_mlme_core::{
    decode_frame, encode_frame, CapabilitySet, MacAddr, MgmtBody, MgmtFrame, MlmState, Role, SessionRef,
};

use crate::application::context::{EngineConfig, MlmeContext, Ports};
use crate::application::events::{JoinParams, MlmeEvent, SmeRequest, StartBssParams};
use crate::application::timers::TimerKey;
use crate::application::tx_pipeline::TxStatus;
use crate::application::upstream::MlmeIndication;
use crate::infrastructure::clock::ManualClock;
use crate::infrastructure::radio::mock::RecordingRadio;
use crate::infrastructure::scan::RecordingScan;
use crate::infrastructure::timer::ManualScheduler;
use crate::infrastructure::upstream::RecordingUpstream;

pub(crate) const AP1: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0x01]);
pub(crate) const AP2: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0x02]);
/// Our own BSS in AP-role tests.
pub(crate) const BSS: MacAddr = MacAddr([0x0a, 0, 0, 0, 0, 0xb0]);
pub(crate) const STA: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x10]);
pub(crate) const STA2: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x11]);

/// 1, 2, 5.5 and 11 Mb/s basic, plus 6 to 18 Mb/s.
pub(crate) const RATES: [u8; 8] = [0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24];

pub(crate) fn caps() -> CapabilitySet {
    CapabilitySet {
        rates: RATES.to_vec(),
        ..CapabilitySet::default()
    }
}

pub(crate) fn beacon(channel: u8) -> BeaconBody {
    BeaconBody {
        beacon_interval: 100,
        capability: CapabilityInfo(CapabilityInfo::ESS),
        ssid: b"lab".to_vec(),
        rates: RATES.to_vec(),
        channel: Some(channel),
        ..BeaconBody::default()
    }
}

/// A station join for `bssid` with the beacon already in hand.
pub(crate) fn join_params(bssid: MacAddr, auth_algorithm: AuthAlgorithm) -> JoinParams {
    JoinParams {
        vdev_id: 0,
        self_mac: STA,
        bssid,
        ssid: b"lab".to_vec(),
        channel: 6,
        ch_width_40: false,
        role: Role::Sta,
        caps: caps(),
        auth_algorithm,
        security: SecurityMaterial::default(),
        beacon: Some(beacon(6)),
        listen_interval: 0,
    }
}

/// An AP on channel 6 holding one WEP key, so shared key is available.
pub(crate) fn ap_params(bssid: MacAddr) -> StartBssParams {
    let mut security = SecurityMaterial::default();
    security.wep_keys[0] = Some(b"wepk1".to_vec());
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
        security,
        max_peers: 0,
        rifs_permitted: false,
        noa: None,
    }
}

/// A frame from `ap` to our station.
pub(crate) fn from_ap(ap: MacAddr, body: MgmtBody) -> MgmtFrame {
    MgmtFrame::new(STA, ap, ap, body)
}

/// A frame from station `sta` to `ap`.
pub(crate) fn to_ap(sta: MacAddr, ap: MacAddr, body: MgmtBody) -> MgmtFrame {
    MgmtFrame::new(ap, sta, ap, body)
}

pub(crate) struct Bed {
    pub ctx: MlmeContext,
    pub radio: Arc<RecordingRadio>,
    pub timers: Arc<ManualScheduler>,
    pub scan: Arc<RecordingScan>,
    pub upstream: Arc<RecordingUpstream>,
    pub clock: Arc<ManualClock>,
}

impl Bed {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut EngineConfig)) -> Self {
        let mut config = EngineConfig::default();
        tweak(&mut config);
        let radio = Arc::new(RecordingRadio::new());
        let timers = Arc::new(ManualScheduler::new());
        let scan = Arc::new(RecordingScan::new());
        let upstream = Arc::new(RecordingUpstream::new());
        let clock = Arc::new(ManualClock::new(0));
        let ports = Ports {
            radio: radio.clone(),
            timers: timers.clone(),
            scan: scan.clone(),
            upstream: upstream.clone(),
            clock: clock.clone(),
        };
        Self {
            ctx: MlmeContext::new(config, ports),
            radio,
            timers,
            scan,
            upstream,
            clock,
        }
    }

    pub fn handle(&mut self, event: MlmeEvent) {
        self.ctx.handle_event(event);
    }

    pub fn sme(&mut self, request: SmeRequest) {
        self.handle(MlmeEvent::Sme(request));
    }

    pub fn rx(&mut self, frame: &MgmtFrame) {
        let bytes = encode_frame(frame).expect("test frame encodes");
        self.handle(MlmeEvent::RxFrame { vdev_id: 0, bytes });
    }

    pub fn session(&self, bssid: MacAddr) -> Option<SessionRef> {
        self.ctx.sessions().find_by_bssid(&bssid)
    }

    pub fn mlm(&self, sref: SessionRef) -> Option<MlmState> {
        self.ctx.sessions().get(sref).map(|s| s.mlm_state())
    }

    pub fn indications(&self) -> Vec<MlmeIndication> {
        self.upstream.posted()
    }

    /// The last frame handed to the radio, decoded.  Protected bodies other
    /// than Authentication are decoded as the hardware would deliver them.
    pub fn last_sent_frame(&self) -> Option<MgmtFrame> {
        let request = self.radio.sent().pop()?;
        let mut frame = decode_frame(request.buffer.as_slice()).ok()?;
        if let MgmtBody::Encrypted { subtype, bytes } = &frame.body {
            if *subtype != MgmtSubtype::Authentication {
                frame.body = decode_body(*subtype, bytes).ok()?;
            }
        }
        Some(frame)
    }

    /// Reports `status` for the most recently sent frame.
    pub fn complete_last(&mut self, status: TxStatus) {
        let request = self.radio.sent().pop().expect("a frame was sent");
        self.handle(MlmeEvent::TxComplete {
            token: request.token,
            status,
            buffer: request.buffer,
        });
    }

    /// Expires the timer armed for `key`.  Returns `false` if none was.
    pub fn fire(&mut self, key: TimerKey) -> bool {
        let Some(id) = self.ctx.timers().armed_id(&key) else {
            return false;
        };
        self.handle(MlmeEvent::TimerFired(id));
        true
    }

    /// Joins, authenticates (open system) and associates with `ap`.
    pub fn link_station(&mut self, ap: MacAddr) -> SessionRef {
        self.link_station_with(join_params(ap, AuthAlgorithm::OpenSystem))
    }

    pub fn link_station_with(&mut self, params: JoinParams) -> SessionRef {
        let ap = params.bssid;
        let algorithm = params.auth_algorithm;
        self.sme(SmeRequest::Join(params));
        let sref = self.session(ap).expect("join created a session");
        self.rx(&from_ap(
            ap,
            MgmtBody::Authentication(Authentication::new(algorithm, 2, StatusCode::SUCCESS)),
        ));
        let response = AssocResponse {
            capability: CapabilityInfo(CapabilityInfo::ESS),
            status: StatusCode::SUCCESS,
            aid: 1,
            rates: RATES.to_vec(),
            ..AssocResponse::default()
        };
        self.rx(&from_ap(ap, MgmtBody::AssocResponse(response)));
        assert_eq!(self.mlm(sref), Some(MlmState::LinkEstablished), "station linked");
        sref
    }
}
