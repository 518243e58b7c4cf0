//! Access-point flows: start and stop the BSS, authenticate and admit
//! stations, answer probes, keep protection current.
//!
//! # A station joining our BSS (for beginners)
//!
//! ```text
//!  Auth 1 ──► pre-auth node ──► Auth 2            (open system: done)
//!                 │
//!                 ├─ shared key: challenge ──► Auth 3 (WEP) ──► Auth 4
//!                 └─ SAE / FT:   frames go up to the SME until AuthComplete
//!
//!  Assoc Request ──► checks ──► peer table (AID) ──► Assoc Response, AssocInd
//! ```
//!
//! The pre-auth registry holds a station from its first Authentication
//! frame until it associates; the peer table holds associated stations.
//! Admitting or removing a peer feeds the protection engine, and whatever
//! it reports as changed goes up as `BeaconParamsChanged` so the beacon
//! template can be rebuilt.

use rand::RngCore;
use tracing::{debug, info, warn};
use wlan_mlme_core::domain::capabilities::Band;
use wlan_mlme_core::domain::protection::OverlapObservation;
use wlan_mlme_core::protocol::frames::{
    AssocRequest, AssocResponse, AuthAlgorithm, Authentication, BeaconBody, CapabilityInfo, ProbeRequest, ReasonCode,
    StatusCode,
};
use wlan_mlme_core::protocol::ie::{HtOperation, CHALLENGE_TEXT_LEN};
use wlan_mlme_core::protocol::{decode_body, wep, MgmtSubtype};
use wlan_mlme_core::{
    decode_frame, CapabilitySet, MacAddr, MgmtBody, MgmtFrame, MlmState, PreAuthNode, Session,
    SessionParams, SessionRef, SmeState, TimerClass,
};

use crate::application::context::{disconnect_cnf, MlmeContext};
use crate::application::events::StartBssParams;
use crate::application::timers::TimerKey;
use crate::application::tx_pipeline::{Continuation, TxClass};
use crate::application::upstream::{MlmeIndication, ResultCode};

/// Probe Response body advertising `session`'s BSS.
fn ap_beacon_body(session: &Session) -> BeaconBody {
    let caps = &session.self_caps;
    BeaconBody {
        beacon_interval: session.beacon_interval,
        capability: ap_capability(session),
        ssid: session.ssid.clone(),
        rates: caps.rates.clone(),
        channel: Some(session.channel),
        erp: (session.band() == Band::TwoGhz).then(|| session.protection.erp_info()),
        ht_cap: caps.ht,
        ht_op: ap_ht_operation(session),
        vht_cap: caps.vht,
        he_cap: caps.he.clone(),
        rsn: session.security.rsn_ie.clone(),
        wpa: session.security.wpa_ie.clone(),
        ..BeaconBody::default()
    }
}

fn ap_capability(session: &Session) -> CapabilityInfo {
    let capability = session.self_caps.capability.with(CapabilityInfo::ESS);
    if session.security.privacy {
        capability.with(CapabilityInfo::PRIVACY)
    } else {
        capability
    }
}

/// HT Operation element with the current protection fields, for an HT BSS.
fn ap_ht_operation(session: &Session) -> Option<HtOperation> {
    session.self_caps.ht?;
    let mut op = HtOperation {
        primary_channel: session.channel,
        ..HtOperation::default()
    };
    session.protection.apply_to_ht_operation(&mut op);
    Some(op)
}

/// First reason an association request from a station must be refused.
fn ap_assoc_refusal(session: &Session, req: &AssocRequest, known_peer: bool) -> Option<StatusCode> {
    if req.ssid != session.ssid {
        return Some(StatusCode::UNSPECIFIED_FAILURE);
    }
    if !session.self_caps.basic_rates_supported_by(&req.rates) {
        return Some(StatusCode::BASIC_RATES_MISMATCH);
    }
    if session.security.pmf_required && req.rsn.is_none() {
        return Some(StatusCode::ROBUST_MGMT_POLICY_VIOLATION);
    }
    if session.security.rsn_ie.is_some() && req.rsn.is_none() && req.wpa.is_none() {
        return Some(StatusCode::INVALID_ELEMENT);
    }
    if !known_peer && session.peers.is_full() {
        return Some(StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA);
    }
    None
}

impl MlmeContext {
    // ── BSS lifecycle ────────────────────────────────────────────────────────

    pub(crate) fn ap_start_bss(&mut self, params: StartBssParams) {
        let bssid = params.bssid;
        if !params.role.is_ap_like() {
            warn!(bssid = %bssid, role = ?params.role, "start BSS requested for a non-AP role");
            self.post(MlmeIndication::StartBssCnf {
                bssid,
                result: ResultCode::InvalidParameters,
            });
            return;
        }
        let max_peers = if params.max_peers == 0 {
            self.config.max_peers
        } else {
            params.max_peers
        };
        let session_params = SessionParams {
            vdev_id: params.vdev_id,
            channel: params.channel,
            max_peers,
            preauth_capacity: self.config.preauth_capacity,
            open_auth_timeout: self.config.open_auth_timeout_ticks,
            protection_cache_size: self.config.protection_cache_size,
            ..SessionParams::new(bssid, params.self_mac, params.role)
        };
        let outcome = match self.sessions.create(session_params) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(bssid = %bssid, error = %e, "start BSS refused");
                self.post(MlmeIndication::StartBssCnf {
                    bssid,
                    result: ResultCode::ResourcesUnavailable,
                });
                return;
            }
        };
        let sref = outcome.sref;
        if !outcome.created {
            warn!(session = %sref, bssid = %bssid, "BSS already running");
            self.post(MlmeIndication::StartBssCnf {
                bssid,
                result: ResultCode::InvalidState,
            });
            return;
        }

        let cache_size = self.config.protection_cache_size;
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        session.ssid = params.ssid;
        session.ch_width_40 = params.ch_width_40;
        session.beacon_interval = params.beacon_interval;
        session.self_caps = params.caps;
        session.security = params.security;
        session.p2p_noa = params.noa;
        session.configure_protection(cache_size, params.rifs_permitted);
        info!(session = %sref, bssid = %bssid, channel = params.channel, max_peers, "starting BSS");

        self.enter_mlm(sref, MlmState::BssStarted);
        self.enter_sme(sref, SmeState::Normal);
        let decay = self.config.overlap_decay;
        self.timers.arm(TimerKey::session(sref, TimerClass::OverlapDecay), decay);
        self.post(MlmeIndication::StartBssCnf {
            bssid,
            result: ResultCode::Success,
        });
    }

    /// Deauthenticates everyone with one broadcast frame, then deletes the
    /// session once that frame is gone.
    pub(crate) fn ap_stop_bss(&mut self, bssid: MacAddr) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "stop for unknown BSS");
            self.post(MlmeIndication::StopBssCnf {
                bssid,
                result: ResultCode::InvalidParameters,
            });
            return;
        };
        let running = self
            .sessions
            .get(sref)
            .is_some_and(|s| s.is_ap() && s.mlm_state() == MlmState::BssStarted);
        if !running {
            warn!(session = %sref, "stop for a BSS that is not running");
            self.post(MlmeIndication::StopBssCnf {
                bssid,
                result: ResultCode::InvalidState,
            });
            return;
        }
        info!(session = %sref, bssid = %bssid, "stopping BSS");
        self.enter_sme(sref, SmeState::WaitDeauth);
        self.enter_mlm(sref, MlmState::WaitDelBssRsp);
        self.timers.cancel(&TimerKey::session(sref, TimerClass::OverlapDecay));

        let body = self.disconnect_body(sref, ReasonCode::LEAVING_NETWORK_DEAUTH, true);
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let plan = self
            .tx
            .build(session, MacAddr::BROADCAST, TxClass::Deauth, body)
            .with_continuation(Continuation::FinishStopBss);
        if let Err(e) = self.send_disconnect(plan) {
            warn!(session = %sref, error = %e, "broadcast deauthentication not sent");
            self.ap_finish_stop_bss(sref);
        }
    }

    pub(crate) fn ap_finish_stop_bss(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitDelBssRsp {
            debug!(session = %sref, state = ?session.mlm_state(), "stale stop completion");
            return;
        }
        let bssid = session.bssid;
        self.enter_mlm(sref, MlmState::Idle);
        self.enter_sme(sref, SmeState::Idle);
        info!(session = %sref, bssid = %bssid, "BSS stopped");
        self.post(MlmeIndication::StopBssCnf {
            bssid,
            result: ResultCode::Success,
        });
        self.teardown_session(sref);
    }

    pub(crate) fn ap_overlap_decay(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if !session.is_ap() || session.mlm_state() != MlmState::BssStarted {
            return;
        }
        session.protection.decay_overlap();
        self.ap_publish_beacon_update(sref);
        let decay = self.config.overlap_decay;
        self.timers.arm(TimerKey::session(sref, TimerClass::OverlapDecay), decay);
    }

    fn ap_publish_beacon_update(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let bssid = session.bssid;
        if let Some(update) = session.protection.take_beacon_update() {
            self.post(MlmeIndication::BeaconParamsChanged { bssid, update });
        }
    }

    // ── Received frames ──────────────────────────────────────────────────────

    pub(crate) fn ap_on_frame(&mut self, sref: SessionRef, frame: MgmtFrame, bytes: &[u8]) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::BssStarted {
            debug!(session = %sref, state = ?session.mlm_state(), "AP not running, frame dropped");
            return;
        }
        let own_bssid = session.bssid;
        let header = frame.header;
        match frame.body {
            MgmtBody::Beacon(beacon) | MgmtBody::ProbeResponse(beacon) => {
                if header.bssid != own_bssid {
                    self.ap_on_neighbour_beacon(sref, header.bssid, &beacon);
                }
            }
            MgmtBody::ProbeRequest(probe) => self.ap_on_probe_request(sref, header.sa, &probe),
            _ if header.bssid != own_bssid => {
                debug!(session = %sref, bssid = %header.bssid, "frame for another BSS dropped");
            }
            MgmtBody::Authentication(auth) => self.ap_on_auth(sref, header.sa, auth),
            MgmtBody::Encrypted {
                subtype: MgmtSubtype::Authentication,
                bytes: protected,
            } => self.ap_on_auth3(sref, header.sa, &protected),
            MgmtBody::AssocRequest(req) => self.ap_on_assoc_request(sref, header.sa, req, false, bytes),
            MgmtBody::ReassocRequest(req) => self.ap_on_assoc_request(sref, header.sa, req, true, bytes),
            MgmtBody::Deauthentication(d) => self.ap_on_peer_disconnect(sref, header.sa, d.reason, header.protected, true),
            MgmtBody::Disassociation(d) => self.ap_on_peer_disconnect(sref, header.sa, d.reason, header.protected, false),
            MgmtBody::Action(action) => self.on_action(sref, header.sa, header.protected, action),
            other => debug!(session = %sref, subtype = ?other.subtype(), "frame ignored by AP"),
        }
    }

    fn ap_on_neighbour_beacon(&mut self, sref: SessionRef, neighbour: MacAddr, beacon: &BeaconBody) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if beacon.channel.is_some_and(|ch| ch != session.channel) {
            return;
        }
        session
            .protection
            .on_overlap_beacon(neighbour, OverlapObservation::from_beacon(beacon));
        self.ap_publish_beacon_update(sref);
    }

    fn ap_on_probe_request(&mut self, sref: SessionRef, sta: MacAddr, probe: &ProbeRequest) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if !probe.ssid.is_empty() && probe.ssid != session.ssid {
            return;
        }
        let body = MgmtBody::ProbeResponse(ap_beacon_body(session));
        let mut plan = self.tx.build(session, sta, TxClass::ProbeResponse, body);
        if let Some(noa) = session.p2p_noa.clone() {
            plan = plan.with_optional_ie(noa);
        }
        if let Err(e) = self.tx.send(plan) {
            debug!(session = %sref, sta = %sta, error = %e, "probe response not sent");
        }
    }

    // ── Authentication ───────────────────────────────────────────────────────

    fn ap_on_auth(&mut self, sref: SessionRef, sta: MacAddr, auth: Authentication) {
        let sme_driven = matches!(auth.algorithm, AuthAlgorithm::Sae | AuthAlgorithm::FastTransition);
        if sme_driven && auth.transaction_seq != 1 {
            let waiting = self
                .sessions
                .get(sref)
                .and_then(|s| s.preauth.search(&sta))
                .is_some_and(|n| n.state == MlmState::WaitSaeAuth);
            if waiting {
                self.ap_forward_auth(sref, sta, auth);
            } else {
                debug!(session = %sref, sta = %sta, seq = auth.transaction_seq, "unexpected SAE frame dropped");
            }
            return;
        }
        if auth.transaction_seq != 1 {
            debug!(session = %sref, sta = %sta, seq = auth.transaction_seq, "unexpected authentication frame");
            return;
        }
        self.ap_on_auth1(sref, sta, auth);
    }

    fn ap_forward_auth(&mut self, sref: SessionRef, sta: MacAddr, frame: Authentication) {
        if let Some(bssid) = self.sessions.get(sref).map(|s| s.bssid) {
            self.post(MlmeIndication::AuthFrameInd { bssid, peer: sta, frame });
        }
    }

    fn ap_on_auth1(&mut self, sref: SessionRef, sta: MacAddr, auth: Authentication) {
        let algorithm = auth.algorithm;
        let now = self.now();
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let supported = match algorithm {
            AuthAlgorithm::OpenSystem => true,
            AuthAlgorithm::SharedKey => session.security.default_wep_key().is_some(),
            AuthAlgorithm::Sae | AuthAlgorithm::FastTransition => session.security.rsn_ie.is_some(),
        };
        if !supported {
            info!(session = %sref, sta = %sta, ?algorithm, "authentication algorithm refused");
            self.ap_send_auth_reply(sref, sta, algorithm, 2, StatusCode::UNSUPPORTED_AUTH_ALGORITHM, None);
            return;
        }

        // A fresh Authentication frame 1 restarts whatever was in progress.
        session.preauth.delete(&sta);
        if session.preauth.is_full() && !session.preauth.reap_stale(now) {
            self.ap_cancel_released_timers(sref);
            warn!(session = %sref, sta = %sta, "pre-auth registry full");
            self.ap_send_auth_reply(sref, sta, algorithm, 2, StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA, None);
            return;
        }
        let state = match algorithm {
            AuthAlgorithm::OpenSystem => MlmState::Authenticated,
            AuthAlgorithm::SharedKey => MlmState::WaitAuthFrame3,
            AuthAlgorithm::Sae | AuthAlgorithm::FastTransition => MlmState::WaitSaeAuth,
        };
        if let Err(e) = session.preauth.add(PreAuthNode::new(sta, algorithm, state, now)) {
            self.ap_cancel_released_timers(sref);
            warn!(session = %sref, sta = %sta, error = %e, "pre-auth node not added");
            self.ap_send_auth_reply(sref, sta, algorithm, 2, StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA, None);
            return;
        }
        self.ap_cancel_released_timers(sref);
        debug!(session = %sref, sta = %sta, ?algorithm, ?state, "pre-auth node added");

        match algorithm {
            AuthAlgorithm::OpenSystem => {
                if self.ap_send_auth_reply(sref, sta, algorithm, 2, StatusCode::SUCCESS, None) {
                    self.ap_post_auth_ind(sref, sta, algorithm);
                } else {
                    self.ap_delete_node(sref, sta);
                }
            }
            AuthAlgorithm::SharedKey => {
                let mut challenge = vec![0u8; CHALLENGE_TEXT_LEN];
                rand::thread_rng().fill_bytes(&mut challenge);
                if !self.ap_send_auth_reply(sref, sta, algorithm, 2, StatusCode::SUCCESS, Some(challenge.clone())) {
                    self.ap_delete_node(sref, sta);
                    return;
                }
                let after = self.config.auth_frame3_timeout;
                let timer = self.timers.arm(TimerKey::peer(sref, TimerClass::AuthFrame3, sta), after);
                if let Some(node) = self.sessions.get_mut(sref).and_then(|s| s.preauth.search_mut(&sta)) {
                    node.challenge = Some(challenge);
                    node.timer = Some(timer);
                }
            }
            AuthAlgorithm::Sae | AuthAlgorithm::FastTransition => self.ap_forward_auth(sref, sta, auth),
        }
    }

    /// Shared-key Authentication frame 3: decrypt, compare the challenge,
    /// answer with frame 4.
    fn ap_on_auth3(&mut self, sref: SessionRef, sta: MacAddr, protected: &[u8]) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let bssid = session.bssid;
        let expected = match session.preauth.search(&sta) {
            Some(node) if node.state == MlmState::WaitAuthFrame3 => node.challenge.clone(),
            _ => {
                debug!(session = %sref, sta = %sta, "protected authentication frame without a challenge pending");
                return;
            }
        };
        let key = wep::key_id(protected).and_then(|id| session.security.wep_key(id));
        let plaintext = match key.map(|key| wep::decrypt(key, protected)) {
            Some(Ok(plaintext)) => plaintext,
            Some(Err(e)) => {
                warn!(session = %sref, sta = %sta, error = %e, "authentication frame 3 failed decryption");
                self.post(MlmeIndication::DecryptFailure { bssid, peer: sta });
                return;
            }
            None => {
                warn!(session = %sref, sta = %sta, "authentication frame 3 uses an unknown key");
                self.post(MlmeIndication::DecryptFailure { bssid, peer: sta });
                return;
            }
        };
        let auth = match decode_body(MgmtSubtype::Authentication, &plaintext) {
            Ok(MgmtBody::Authentication(auth)) => auth,
            Ok(_) | Err(_) => {
                debug!(session = %sref, sta = %sta, "undecodable authentication frame 3");
                return;
            }
        };
        if auth.algorithm != AuthAlgorithm::SharedKey || auth.transaction_seq != 3 {
            debug!(session = %sref, sta = %sta, seq = auth.transaction_seq, "unexpected protected authentication frame");
            return;
        }
        self.timers.cancel(&TimerKey::peer(sref, TimerClass::AuthFrame3, sta));
        if let Some(node) = self.sessions.get_mut(sref).and_then(|s| s.preauth.search_mut(&sta)) {
            node.timer = None;
        }

        if expected.is_some() && auth.challenge == expected {
            if let Some(node) = self.sessions.get_mut(sref).and_then(|s| s.preauth.search_mut(&sta)) {
                node.state = MlmState::Authenticated;
                node.challenge = None;
            }
            info!(session = %sref, sta = %sta, "shared-key authentication succeeded");
            if self.ap_send_auth_reply(sref, sta, AuthAlgorithm::SharedKey, 4, StatusCode::SUCCESS, None) {
                self.ap_post_auth_ind(sref, sta, AuthAlgorithm::SharedKey);
            } else {
                self.ap_delete_node(sref, sta);
            }
        } else {
            warn!(session = %sref, sta = %sta, "shared-key challenge mismatch");
            self.ap_send_auth_reply(sref, sta, AuthAlgorithm::SharedKey, 4, StatusCode::CHALLENGE_FAILURE, None);
            self.ap_delete_node(sref, sta);
        }
    }

    /// Sends Authentication frame 2 or 4.  Returns whether it was handed to
    /// the radio.
    fn ap_send_auth_reply(
        &mut self,
        sref: SessionRef,
        sta: MacAddr,
        algorithm: AuthAlgorithm,
        transaction_seq: u16,
        status: StatusCode,
        challenge: Option<Vec<u8>>,
    ) -> bool {
        let Some(session) = self.sessions.get(sref) else {
            return false;
        };
        let mut auth = Authentication::new(algorithm, transaction_seq, status);
        auth.challenge = challenge;
        let plan = self
            .tx
            .build(session, sta, TxClass::AuthResponse, MgmtBody::Authentication(auth));
        match self.tx.send(plan) {
            Ok(_) => true,
            Err(e) => {
                warn!(session = %sref, sta = %sta, seq = transaction_seq, error = %e, "authentication reply not sent");
                false
            }
        }
    }

    fn ap_post_auth_ind(&mut self, sref: SessionRef, sta: MacAddr, algorithm: AuthAlgorithm) {
        if let Some(bssid) = self.sessions.get(sref).map(|s| s.bssid) {
            info!(session = %sref, sta = %sta, ?algorithm, "station authenticated");
            self.post(MlmeIndication::AuthInd {
                bssid,
                peer: sta,
                algorithm,
            });
        }
    }

    /// The SME finished an SAE or FT exchange with `sta`.
    pub(crate) fn ap_auth_complete(&mut self, sref: SessionRef, sta: MacAddr, status: StatusCode) {
        let Some(node) = self.sessions.get_mut(sref).and_then(|s| s.preauth.search_mut(&sta)) else {
            debug!(session = %sref, sta = %sta, "auth completion without a pre-auth node");
            return;
        };
        if node.state != MlmState::WaitSaeAuth {
            debug!(session = %sref, sta = %sta, state = ?node.state, "auth completion in unexpected state");
            return;
        }
        if !status.is_success() {
            info!(session = %sref, sta = %sta, status = status.0, "SME rejected authentication");
            self.ap_delete_node(sref, sta);
            return;
        }
        node.state = MlmState::Authenticated;
        let algorithm = node.auth_type;
        let deferred = node.deferred_assoc_req.take();
        self.ap_post_auth_ind(sref, sta, algorithm);

        let Some(raw) = deferred else {
            return;
        };
        debug!(session = %sref, sta = %sta, len = raw.len(), "replaying deferred association request");
        match decode_frame(&raw) {
            Ok(frame) => match frame.body {
                MgmtBody::AssocRequest(req) => self.ap_on_assoc_request(sref, sta, req, false, &raw),
                MgmtBody::ReassocRequest(req) => self.ap_on_assoc_request(sref, sta, req, true, &raw),
                other => debug!(session = %sref, subtype = ?other.subtype(), "deferred frame is not a request"),
            },
            Err(e) => debug!(session = %sref, error = %e, "deferred association request undecodable"),
        }
    }

    pub(crate) fn ap_auth_frame3_timeout(&mut self, sref: SessionRef, sta: MacAddr) {
        let waiting = self
            .sessions
            .get(sref)
            .and_then(|s| s.preauth.search(&sta))
            .is_some_and(|n| n.state == MlmState::WaitAuthFrame3);
        if waiting {
            info!(session = %sref, sta = %sta, "no authentication frame 3, dropping station");
            if let Some(node) = self.sessions.get_mut(sref).and_then(|s| s.preauth.search_mut(&sta)) {
                // The timer that fired is already gone.
                node.timer = None;
            }
            self.ap_delete_node(sref, sta);
        }
    }

    fn ap_delete_node(&mut self, sref: SessionRef, sta: MacAddr) {
        if let Some(session) = self.sessions.get_mut(sref) {
            session.preauth.delete(&sta);
        }
        self.ap_cancel_released_timers(sref);
    }

    fn ap_cancel_released_timers(&mut self, sref: SessionRef) {
        let released = self
            .sessions
            .get_mut(sref)
            .map(|s| s.preauth.take_released_timers())
            .unwrap_or_default();
        for id in released {
            self.timers.cancel_id(id);
        }
    }

    // ── Association ──────────────────────────────────────────────────────────

    fn ap_on_assoc_request(&mut self, sref: SessionRef, sta: MacAddr, req: AssocRequest, reassoc: bool, raw: &[u8]) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let known_peer = session.peers.get(&sta).is_some();
        let node_state = session.preauth.search(&sta).map(|n| n.state);
        match node_state {
            Some(MlmState::Authenticated) => {}
            Some(MlmState::WaitSaeAuth) => {
                if let Some(node) = session.preauth.search_mut(&sta) {
                    debug!(session = %sref, sta = %sta, "association request deferred until SAE completes");
                    node.deferred_assoc_req = Some(raw.to_vec());
                }
                return;
            }
            None if known_peer => {}
            _ => {
                info!(session = %sref, sta = %sta, reassoc, "association request from unauthenticated station");
                self.ap_send_deauth(sref, sta, ReasonCode::CLASS2_FRAME_FROM_NONAUTH_STA);
                return;
            }
        }

        if let Some(status) = ap_assoc_refusal(session, &req, known_peer) {
            info!(session = %sref, sta = %sta, status = status.0, reassoc, "association refused");
            let response = AssocResponse {
                capability: ap_capability(session),
                status,
                ..AssocResponse::default()
            };
            self.ap_send_assoc_response(sref, sta, reassoc, response);
            self.ap_delete_node(sref, sta);
            return;
        }

        let band = session.band();
        let negotiated = session.self_caps.intersect(&CapabilitySet::from_assoc_request(&req));
        let algorithm = session
            .preauth
            .search(&sta)
            .map(|n| n.auth_type)
            .or_else(|| session.peers.get(&sta).map(|p| p.auth_algorithm))
            .unwrap_or(AuthAlgorithm::OpenSystem);
        if known_peer {
            session.peers.remove(&sta);
            session.protection.on_peer_removed(&sta);
        }
        let pmf_capable = session.security.pmf_capable;
        let (aid, legacy) = match session.peers.admit(sta, negotiated, band) {
            Ok(peer) => {
                peer.listen_interval = req.listen_interval;
                peer.rsn = req.rsn.clone();
                peer.pmf.enabled = pmf_capable && req.rsn.is_some();
                peer.auth_algorithm = algorithm;
                (peer.aid, peer.legacy)
            }
            Err(e) => {
                warn!(session = %sref, sta = %sta, error = %e, "peer not admitted");
                let response = AssocResponse {
                    capability: ap_capability(session),
                    status: StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA,
                    ..AssocResponse::default()
                };
                self.ap_send_assoc_response(sref, sta, reassoc, response);
                self.ap_delete_node(sref, sta);
                return;
            }
        };
        session.protection.on_peer_associated(sta, legacy);

        let response = AssocResponse {
            capability: ap_capability(session),
            status: StatusCode::SUCCESS,
            aid,
            rates: session.self_caps.rates.clone(),
            ht_cap: session.self_caps.ht.filter(|_| req.ht_cap.is_some()),
            ht_op: ap_ht_operation(session).filter(|_| req.ht_cap.is_some()),
            vht_cap: session.self_caps.vht.filter(|_| req.vht_cap.is_some()),
            he_cap: session.self_caps.he.clone().filter(|_| req.he_cap.is_some()),
            erp: (band == Band::TwoGhz).then(|| session.protection.erp_info()),
            ..AssocResponse::default()
        };
        let bssid = session.bssid;
        if !self.ap_send_assoc_response(sref, sta, reassoc, response) {
            // The station keeps its authentication and may ask again.
            if let Some(session) = self.sessions.get_mut(sref) {
                session.peers.remove(&sta);
                session.protection.on_peer_removed(&sta);
                session.protection.take_beacon_update();
            }
            return;
        }
        self.ap_delete_node(sref, sta);
        info!(session = %sref, sta = %sta, aid, reassoc, legacy = legacy.is_legacy(), "station associated");
        self.post(MlmeIndication::AssocInd {
            bssid,
            peer: sta,
            aid,
            reassoc,
            rsn: req.rsn,
        });
        self.ap_publish_beacon_update(sref);
    }

    fn ap_send_assoc_response(&mut self, sref: SessionRef, sta: MacAddr, reassoc: bool, response: AssocResponse) -> bool {
        let Some(session) = self.sessions.get(sref) else {
            return false;
        };
        let body = if reassoc {
            MgmtBody::ReassocResponse(response)
        } else {
            MgmtBody::AssocResponse(response)
        };
        let mut plan = self.tx.build(session, sta, TxClass::AssocResponse, body);
        if let Some(noa) = session.p2p_noa.clone() {
            plan = plan.with_optional_ie(noa);
        }
        match self.tx.send(plan) {
            Ok(_) => true,
            Err(e) => {
                warn!(session = %sref, sta = %sta, error = %e, "association response not sent");
                false
            }
        }
    }

    fn ap_send_deauth(&mut self, sref: SessionRef, sta: MacAddr, reason: ReasonCode) {
        let body = self.disconnect_body(sref, reason, true);
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let plan = self.tx.build(session, sta, TxClass::Deauth, body);
        if let Err(e) = self.send_disconnect(plan) {
            debug!(session = %sref, sta = %sta, error = %e, "deauthentication not sent");
        }
    }

    // ── Disconnection ────────────────────────────────────────────────────────

    fn ap_on_peer_disconnect(&mut self, sref: SessionRef, sta: MacAddr, reason: ReasonCode, protected: bool, deauth: bool) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let pmf = session.peers.get(&sta).is_some_and(|p| p.pmf.enabled);
        if pmf && !protected {
            info!(session = %sref, sta = %sta, deauth, "unprotected disconnect from a PMF station, probing with SA Query");
            self.start_sa_query(sref, sta);
            return;
        }
        let bssid = session.bssid;
        let was_peer = session.peers.remove(&sta).is_some();
        if was_peer {
            session.protection.on_peer_removed(&sta);
        }
        let had_node = session.preauth.search(&sta).is_some();
        if !was_peer && !had_node {
            debug!(session = %sref, sta = %sta, "disconnect from an unknown station");
            return;
        }
        if deauth {
            self.ap_delete_node(sref, sta);
        }
        self.timers.cancel(&TimerKey::peer(sref, TimerClass::SaQuery, sta));
        info!(session = %sref, sta = %sta, reason = reason.0, deauth, "station left");
        let indication = if deauth {
            MlmeIndication::DeauthInd { bssid, peer: sta, reason }
        } else {
            MlmeIndication::DisassocInd { bssid, peer: sta, reason }
        };
        self.post(indication);
        self.ap_publish_beacon_update(sref);
    }

    /// SME-requested deauthentication or disassociation of one station.
    pub(crate) fn ap_disconnect_peer(&mut self, sref: SessionRef, sta: MacAddr, reason: ReasonCode, deauth: bool) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let bssid = session.bssid;
        let known = session.peers.get(&sta).is_some() || session.preauth.search(&sta).is_some();
        if !known {
            warn!(session = %sref, sta = %sta, "disconnect for an unknown station");
            self.post(disconnect_cnf(bssid, sta, deauth, ResultCode::InvalidParameters));
            return;
        }
        if self.peer_disconnects.contains_key(&(sref, sta)) {
            warn!(session = %sref, sta = %sta, "disconnect already in progress");
            self.post(disconnect_cnf(bssid, sta, deauth, ResultCode::InvalidState));
            return;
        }

        let body = self.disconnect_body(sref, reason, deauth);
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let class = if deauth { TxClass::Deauth } else { TxClass::Disassoc };
        let plan = self
            .tx
            .build(session, sta, class, body)
            .with_continuation(Continuation::FinishDisconnect { deauth });
        self.peer_disconnects.insert((sref, sta), deauth);
        match self.send_disconnect(plan) {
            Ok(_) => {
                info!(session = %sref, sta = %sta, reason = reason.0, deauth, "disconnecting station");
                let after = self.config.disconnect_ack_timeout;
                self.timers.arm(TimerKey::peer(sref, TimerClass::DisconnectAck, sta), after);
            }
            Err(e) => {
                // The station is removed either way; only the frame is lost.
                warn!(session = %sref, sta = %sta, error = %e, "disconnect frame not sent");
                self.ap_finish_peer_disconnect(sref, sta);
            }
        }
    }

    pub(crate) fn ap_finish_peer_disconnect(&mut self, sref: SessionRef, sta: MacAddr) {
        let Some(deauth) = self.peer_disconnects.remove(&(sref, sta)) else {
            debug!(session = %sref, sta = %sta, "no disconnect pending");
            return;
        };
        self.timers.cancel(&TimerKey::peer(sref, TimerClass::DisconnectAck, sta));
        self.timers.cancel(&TimerKey::peer(sref, TimerClass::SaQuery, sta));
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let bssid = session.bssid;
        if session.peers.remove(&sta).is_some() {
            session.protection.on_peer_removed(&sta);
        }
        if deauth {
            self.ap_delete_node(sref, sta);
        }
        info!(session = %sref, sta = %sta, deauth, "station disconnected");
        self.post(disconnect_cnf(bssid, sta, deauth, ResultCode::Success));
        self.ap_publish_beacon_update(sref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::{MlmeEvent, SmeRequest};
    use crate::application::test_support::{ap_params, to_ap, Bed, BSS, STA, STA2};
    use crate::application::tx_pipeline::TxStatus;
    use wlan_mlme_core::protocol::frames::{Disconnect, ProbeRequest};
    use wlan_mlme_core::protocol::{encode_body, wep};
    use wlan_mlme_core::decode_frame;

    fn auth1(algorithm: AuthAlgorithm) -> MgmtBody {
        MgmtBody::Authentication(Authentication::new(algorithm, 1, StatusCode::SUCCESS))
    }

    fn assoc_request() -> AssocRequest {
        AssocRequest {
            listen_interval: 10,
            ssid: b"lab".to_vec(),
            rates: vec![0x82, 0x84, 0x8b, 0x96, 0x0c, 0x12, 0x18, 0x24],
            ..AssocRequest::default()
        }
    }

    fn started() -> Bed {
        let mut bed = Bed::new();
        bed.sme(SmeRequest::StartBss(ap_params(BSS)));
        bed
    }

    fn open_auth(bed: &mut Bed, sta: MacAddr) {
        bed.rx(&to_ap(sta, BSS, auth1(AuthAlgorithm::OpenSystem)));
    }

    fn last_auth(bed: &Bed) -> Option<Authentication> {
        match bed.last_sent_frame().map(|f| f.body) {
            Some(MgmtBody::Authentication(auth)) => Some(auth),
            _ => None,
        }
    }

    fn last_assoc_response(bed: &Bed) -> Option<AssocResponse> {
        match bed.last_sent_frame().map(|f| f.body) {
            Some(MgmtBody::AssocResponse(resp)) | Some(MgmtBody::ReassocResponse(resp)) => Some(resp),
            _ => None,
        }
    }

    /// Authentication frame 3 as a station holding `key` would send it.
    fn shared_key_frame3(key: &[u8], challenge: Vec<u8>) -> MgmtFrame {
        let mut auth = Authentication::new(AuthAlgorithm::SharedKey, 3, StatusCode::SUCCESS);
        auth.challenge = Some(challenge);
        let plaintext = encode_body(&MgmtBody::Authentication(auth)).expect("encode");
        let bytes = wep::encrypt(key, 0, [7, 7, 7], &plaintext).expect("encrypt");
        let mut frame = to_ap(
            STA,
            BSS,
            MgmtBody::Encrypted {
                subtype: MgmtSubtype::Authentication,
                bytes,
            },
        );
        frame.header.protected = true;
        frame
    }

    #[test]
    fn test_start_bss_confirms_and_arms_overlap_decay() {
        // Arrange / Act
        let bed = started();

        // Assert
        let sref = bed.session(BSS).expect("session");
        assert_eq!(bed.mlm(sref), Some(MlmState::BssStarted));
        assert!(bed.ctx.timers().is_armed(&TimerKey::session(sref, TimerClass::OverlapDecay)));
        assert_eq!(
            bed.indications(),
            vec![MlmeIndication::StartBssCnf {
                bssid: BSS,
                result: ResultCode::Success
            }]
        );
    }

    #[test]
    fn test_start_bss_twice_is_refused() {
        let mut bed = started();
        bed.sme(SmeRequest::StartBss(ap_params(BSS)));
        assert_eq!(
            bed.indications().last(),
            Some(&MlmeIndication::StartBssCnf {
                bssid: BSS,
                result: ResultCode::InvalidState
            })
        );
    }

    #[test]
    fn test_open_auth_answers_and_indicates() {
        // Arrange
        let mut bed = started();

        // Act
        open_auth(&mut bed, STA);

        // Assert
        let reply = last_auth(&bed).expect("auth reply");
        assert_eq!(reply.transaction_seq, 2);
        assert!(reply.status.is_success());
        assert!(bed.indications().contains(&MlmeIndication::AuthInd {
            bssid: BSS,
            peer: STA,
            algorithm: AuthAlgorithm::OpenSystem
        }));
        let sref = bed.session(BSS).expect("session");
        let node_state = bed.ctx.sessions().get(sref).and_then(|s| s.preauth.search(&STA)).map(|n| n.state);
        assert_eq!(node_state, Some(MlmState::Authenticated));
    }

    #[test]
    fn test_shared_key_round_trip_authenticates() {
        // Arrange
        let mut bed = started();
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::SharedKey)));
        let challenge = last_auth(&bed).and_then(|a| a.challenge).expect("challenge");

        // Act
        bed.rx(&shared_key_frame3(b"wepk1", challenge.clone()));

        // Assert
        assert_eq!(challenge.len(), CHALLENGE_TEXT_LEN);
        let reply = last_auth(&bed).expect("frame 4");
        assert_eq!(reply.transaction_seq, 4);
        assert!(reply.status.is_success());
        assert!(bed.indications().contains(&MlmeIndication::AuthInd {
            bssid: BSS,
            peer: STA,
            algorithm: AuthAlgorithm::SharedKey
        }));
        let sref = bed.session(BSS).expect("session");
        assert!(!bed.ctx.timers().is_armed(&TimerKey::peer(sref, TimerClass::AuthFrame3, STA)));
    }

    #[test]
    fn test_shared_key_wrong_challenge_fails_and_forgets_station() {
        // Arrange
        let mut bed = started();
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::SharedKey)));

        // Act
        bed.rx(&shared_key_frame3(b"wepk1", vec![0xee; CHALLENGE_TEXT_LEN]));

        // Assert
        let reply = last_auth(&bed).expect("frame 4");
        assert_eq!(reply.status, StatusCode::CHALLENGE_FAILURE);
        let sref = bed.session(BSS).expect("session");
        assert!(bed.ctx.sessions().get(sref).and_then(|s| s.preauth.search(&STA)).is_none());
    }

    #[test]
    fn test_shared_key_wrong_key_reports_decrypt_failure() {
        // Arrange
        let mut bed = started();
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::SharedKey)));
        let challenge = last_auth(&bed).and_then(|a| a.challenge).expect("challenge");

        // Act
        bed.rx(&shared_key_frame3(b"wrong", challenge));

        // Assert
        assert!(bed.indications().contains(&MlmeIndication::DecryptFailure { bssid: BSS, peer: STA }));
        let sref = bed.session(BSS).expect("session");
        let node_state = bed.ctx.sessions().get(sref).and_then(|s| s.preauth.search(&STA)).map(|n| n.state);
        assert_eq!(node_state, Some(MlmState::WaitAuthFrame3));
    }

    #[test]
    fn test_frame3_timeout_drops_pending_station() {
        let mut bed = started();
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::SharedKey)));
        let sref = bed.session(BSS).expect("session");

        assert!(bed.fire(TimerKey::peer(sref, TimerClass::AuthFrame3, STA)));

        assert!(bed.ctx.sessions().get(sref).and_then(|s| s.preauth.search(&STA)).is_none());
    }

    #[test]
    fn test_association_without_authentication_is_deauthenticated() {
        // Arrange
        let mut bed = started();

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Assert
        match bed.last_sent_frame().map(|f| f.body) {
            Some(MgmtBody::Deauthentication(d)) => assert_eq!(d.reason, ReasonCode::CLASS2_FRAME_FROM_NONAUTH_STA),
            other => panic!("expected deauthentication, got {other:?}"),
        }
    }

    #[test]
    fn test_open_station_associates_with_aid_one() {
        // Arrange
        let mut bed = started();
        open_auth(&mut bed, STA);

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Assert
        let resp = last_assoc_response(&bed).expect("assoc response");
        assert!(resp.status.is_success());
        assert_eq!(resp.aid, 1);
        assert!(bed.indications().contains(&MlmeIndication::AssocInd {
            bssid: BSS,
            peer: STA,
            aid: 1,
            reassoc: false,
            rsn: None
        }));
        let sref = bed.session(BSS).expect("session");
        let session = bed.ctx.sessions().get(sref).expect("session");
        assert_eq!(session.peers.get(&STA).map(|p| p.listen_interval), Some(10));
        assert!(session.preauth.search(&STA).is_none());
    }

    #[test]
    fn test_basic_rate_mismatch_is_refused() {
        let mut bed = started();
        open_auth(&mut bed, STA);
        let req = AssocRequest {
            rates: vec![0x0c, 0x12],
            ..assoc_request()
        };

        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(req)));

        let resp = last_assoc_response(&bed).expect("assoc response");
        assert_eq!(resp.status, StatusCode::BASIC_RATES_MISMATCH);
        assert_eq!(resp.aid, 0);
    }

    #[test]
    fn test_pmf_required_without_rsn_is_refused() {
        // Arrange
        let mut bed = Bed::new();
        let mut params = ap_params(BSS);
        params.security.rsn_ie = Some(vec![1, 0]);
        params.security.pmf_capable = true;
        params.security.pmf_required = true;
        bed.sme(SmeRequest::StartBss(params));
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::OpenSystem)));

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Assert
        let resp = last_assoc_response(&bed).expect("assoc response");
        assert_eq!(resp.status, StatusCode::ROBUST_MGMT_POLICY_VIOLATION);
    }

    #[test]
    fn test_full_peer_table_refuses_second_station() {
        // Arrange
        let mut bed = Bed::new();
        let mut params = ap_params(BSS);
        params.max_peers = 1;
        bed.sme(SmeRequest::StartBss(params));
        open_auth(&mut bed, STA);
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));
        open_auth(&mut bed, STA2);

        // Act
        bed.rx(&to_ap(STA2, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Assert
        let resp = last_assoc_response(&bed).expect("assoc response");
        assert_eq!(resp.status, StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA);
    }

    #[test]
    fn test_full_preauth_registry_reclaims_stale_open_nodes() {
        // Arrange
        let mut bed = Bed::with_config(|c| {
            c.preauth_capacity = 1;
            c.open_auth_timeout_ticks = 100;
        });
        bed.sme(SmeRequest::StartBss(ap_params(BSS)));
        open_auth(&mut bed, STA);

        // Act
        open_auth(&mut bed, STA2);
        let refused = last_auth(&bed).map(|a| a.status);
        bed.clock.advance(101);
        open_auth(&mut bed, STA2);
        let accepted = last_auth(&bed).map(|a| a.status);

        // Assert
        assert_eq!(refused, Some(StatusCode::AP_UNABLE_TO_HANDLE_NEW_STA));
        assert_eq!(accepted, Some(StatusCode::SUCCESS));
        let sref = bed.session(BSS).expect("session");
        let session = bed.ctx.sessions().get(sref).expect("session");
        assert!(session.preauth.search(&STA).is_none());
        assert!(session.preauth.search(&STA2).is_some());
    }

    #[test]
    fn test_legacy_station_changes_protection() {
        // Arrange
        let mut bed = started();
        open_auth(&mut bed, STA);
        let req = AssocRequest {
            rates: vec![0x82, 0x84, 0x8b, 0x96],
            ..assoc_request()
        };

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(req)));

        // Assert
        assert!(bed
            .indications()
            .iter()
            .any(|i| matches!(i, MlmeIndication::BeaconParamsChanged { bssid, .. } if *bssid == BSS)));
        let resp = last_assoc_response(&bed).expect("assoc response");
        assert!(resp.erp.is_some_and(|erp| erp.non_erp_present()));
    }

    #[test]
    fn test_sae_frames_go_up_and_deferred_assoc_is_replayed() {
        // Arrange
        let mut bed = Bed::new();
        let mut params = ap_params(BSS);
        params.security.rsn_ie = Some(vec![1, 0]);
        bed.sme(SmeRequest::StartBss(params));
        bed.rx(&to_ap(STA, BSS, auth1(AuthAlgorithm::Sae)));
        let req = AssocRequest {
            rsn: Some(vec![1, 0]),
            ..assoc_request()
        };
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(req)));
        let sent_before = bed.radio.sent().len();

        // Act
        bed.sme(SmeRequest::AuthComplete {
            bssid: BSS,
            peer: STA,
            status: StatusCode::SUCCESS,
        });

        // Assert
        assert!(bed
            .indications()
            .iter()
            .any(|i| matches!(i, MlmeIndication::AuthFrameInd { peer, .. } if *peer == STA)));
        assert_eq!(sent_before, 0);
        let resp = last_assoc_response(&bed).expect("assoc response after replay");
        assert!(resp.status.is_success());
        assert!(bed.indications().contains(&MlmeIndication::AuthInd {
            bssid: BSS,
            peer: STA,
            algorithm: AuthAlgorithm::Sae
        }));
    }

    #[test]
    fn test_probe_request_for_our_ssid_is_answered() {
        // Arrange
        let mut bed = started();
        let probe = ProbeRequest {
            ssid: b"lab".to_vec(),
            ..ProbeRequest::default()
        };
        let other = ProbeRequest {
            ssid: b"elsewhere".to_vec(),
            ..ProbeRequest::default()
        };

        // Act
        bed.rx(&MgmtFrame::new(MacAddr::BROADCAST, STA, MacAddr::BROADCAST, MgmtBody::ProbeRequest(other)));
        let after_other = bed.radio.sent().len();
        bed.rx(&MgmtFrame::new(MacAddr::BROADCAST, STA, MacAddr::BROADCAST, MgmtBody::ProbeRequest(probe)));

        // Assert
        assert_eq!(after_other, 0);
        match bed.last_sent_frame().map(|f| f.body) {
            Some(MgmtBody::ProbeResponse(b)) => {
                assert_eq!(b.ssid, b"lab".to_vec());
                assert_eq!(b.channel, Some(6));
                assert!(b.capability.has(CapabilityInfo::ESS));
            }
            other => panic!("expected probe response, got {other:?}"),
        }
    }

    #[test]
    fn test_sme_deauth_completes_on_ack() {
        // Arrange
        let mut bed = started();
        open_auth(&mut bed, STA);
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Act
        bed.sme(SmeRequest::Deauth {
            bssid: BSS,
            peer: STA,
            reason: ReasonCode::UNSPECIFIED,
        });
        bed.complete_last(TxStatus::Acked);

        // Assert
        assert!(bed.indications().contains(&MlmeIndication::DeauthCnf {
            bssid: BSS,
            peer: STA,
            result: ResultCode::Success
        }));
        let sref = bed.session(BSS).expect("session");
        assert!(bed.ctx.sessions().get(sref).and_then(|s| s.peers.get(&STA)).is_none());
        assert!(!bed.ctx.timers().is_armed(&TimerKey::peer(sref, TimerClass::DisconnectAck, STA)));
    }

    /// Completes the most recent frame addressed to `peer`.
    fn complete_latest_to(bed: &mut Bed, peer: MacAddr, status: TxStatus) {
        let request = bed
            .radio
            .sent()
            .into_iter()
            .rev()
            .find(|r| decode_frame(r.buffer.as_slice()).is_ok_and(|f| f.header.da == peer))
            .expect("a frame to the peer");
        bed.handle(MlmeEvent::TxComplete {
            token: request.token,
            status,
            buffer: request.buffer,
        });
    }

    fn deauths_to(bed: &Bed, peer: MacAddr) -> usize {
        bed.radio
            .sent()
            .iter()
            .filter(|r| r.class == TxClass::Deauth)
            .filter(|r| decode_frame(r.buffer.as_slice()).is_ok_and(|f| f.header.da == peer))
            .count()
    }

    #[test]
    fn test_concurrent_deauths_keep_separate_retry_budgets() {
        // Arrange: two associated stations and a two-retry deauth budget
        let mut bed = Bed::with_config(|c| c.deauth_retry_limit = 2);
        bed.sme(SmeRequest::StartBss(ap_params(BSS)));
        for sta in [STA, STA2] {
            open_auth(&mut bed, sta);
            bed.rx(&to_ap(sta, BSS, MgmtBody::AssocRequest(assoc_request())));
        }
        let deauth = |peer| SmeRequest::Deauth {
            bssid: BSS,
            peer,
            reason: ReasonCode::UNSPECIFIED,
        };
        bed.sme(deauth(STA));
        bed.sme(deauth(STA2));

        // Act: interleave failures, and let the second station's ack land
        // between the first station's retries
        complete_latest_to(&mut bed, STA, TxStatus::NotAcked);
        complete_latest_to(&mut bed, STA2, TxStatus::NotAcked);
        complete_latest_to(&mut bed, STA2, TxStatus::Acked);
        complete_latest_to(&mut bed, STA, TxStatus::NotAcked);
        let first_done_early = bed.indications().contains(&MlmeIndication::DeauthCnf {
            bssid: BSS,
            peer: STA,
            result: ResultCode::Success,
        });
        complete_latest_to(&mut bed, STA, TxStatus::NotAcked);

        // Assert
        assert!(!first_done_early, "a retry remained for the first station");
        assert_eq!(deauths_to(&bed, STA), 3, "one frame plus exactly two resends");
        assert_eq!(deauths_to(&bed, STA2), 2);
        let cnfs: Vec<_> = bed
            .indications()
            .into_iter()
            .filter(|i| matches!(i, MlmeIndication::DeauthCnf { .. }))
            .collect();
        assert_eq!(cnfs.len(), 2);
        let sref = bed.session(BSS).expect("session");
        assert!(bed.ctx.sessions().get(sref).is_some_and(|s| s.peers.is_empty()));
    }

    #[test]
    fn test_sme_disassoc_completes_on_timer_when_no_completion_arrives() {
        let mut bed = started();
        open_auth(&mut bed, STA);
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));
        bed.sme(SmeRequest::Disassoc {
            bssid: BSS,
            peer: STA,
            reason: ReasonCode::INACTIVITY,
        });
        let sref = bed.session(BSS).expect("session");

        assert!(bed.fire(TimerKey::peer(sref, TimerClass::DisconnectAck, STA)));

        assert!(bed.indications().contains(&MlmeIndication::DisassocCnf {
            bssid: BSS,
            peer: STA,
            result: ResultCode::Success
        }));
    }

    #[test]
    fn test_deauth_for_unknown_station_is_refused() {
        let mut bed = started();
        bed.sme(SmeRequest::Deauth {
            bssid: BSS,
            peer: STA,
            reason: ReasonCode::UNSPECIFIED,
        });
        assert_eq!(
            bed.indications().last(),
            Some(&MlmeIndication::DeauthCnf {
                bssid: BSS,
                peer: STA,
                result: ResultCode::InvalidParameters
            })
        );
    }

    #[test]
    fn test_station_leaving_is_indicated() {
        // Arrange
        let mut bed = started();
        open_auth(&mut bed, STA);
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::Disassociation(Disconnect::new(ReasonCode::STA_LEAVING))));

        // Assert
        assert!(bed.indications().contains(&MlmeIndication::DisassocInd {
            bssid: BSS,
            peer: STA,
            reason: ReasonCode::STA_LEAVING
        }));
        let sref = bed.session(BSS).expect("session");
        assert!(bed.ctx.sessions().get(sref).is_some_and(|s| s.peers.is_empty()));
    }

    #[test]
    fn test_unprotected_deauth_from_pmf_station_starts_sa_query() {
        // Arrange
        let mut bed = Bed::new();
        let mut params = ap_params(BSS);
        params.security.rsn_ie = Some(vec![1, 0]);
        params.security.pmf_capable = true;
        bed.sme(SmeRequest::StartBss(params));
        open_auth(&mut bed, STA);
        let req = AssocRequest {
            rsn: Some(vec![1, 0]),
            ..assoc_request()
        };
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(req)));

        // Act
        bed.rx(&to_ap(STA, BSS, MgmtBody::Deauthentication(Disconnect::new(ReasonCode::UNSPECIFIED))));

        // Assert
        let sref = bed.session(BSS).expect("session");
        assert!(bed.ctx.timers().is_armed(&TimerKey::peer(sref, TimerClass::SaQuery, STA)));
        assert!(bed.ctx.sessions().get(sref).and_then(|s| s.peers.get(&STA)).is_some());
        let sent = bed.last_sent_frame().expect("sa query");
        assert!(sent.header.protected);
    }

    #[test]
    fn test_stop_bss_deauths_everyone_then_deletes_session() {
        // Arrange
        let mut bed = started();
        open_auth(&mut bed, STA);
        bed.rx(&to_ap(STA, BSS, MgmtBody::AssocRequest(assoc_request())));

        // Act
        bed.sme(SmeRequest::StopBss { bssid: BSS });
        let deauth = bed.last_sent_frame().expect("broadcast deauth");
        bed.complete_last(TxStatus::Acked);

        // Assert
        assert_eq!(deauth.header.da, MacAddr::BROADCAST);
        assert_eq!(
            bed.indications().last(),
            Some(&MlmeIndication::StopBssCnf {
                bssid: BSS,
                result: ResultCode::Success
            })
        );
        assert_eq!(bed.ctx.sessions().active_count(), 0);
        assert_eq!(bed.ctx.timers().armed_count(), 0);
    }

    #[test]
    fn test_overlap_decay_rearms_itself() {
        let mut bed = started();
        let sref = bed.session(BSS).expect("session");
        let key = TimerKey::session(sref, TimerClass::OverlapDecay);

        assert!(bed.fire(key));

        assert!(bed.ctx.timers().is_armed(&key));
    }

    #[test]
    fn test_legacy_neighbour_beacon_raises_overlap_protection() {
        // Arrange
        let mut bed = started();
        let neighbour = MacAddr([0x0a, 0, 0, 0, 0, 9]);
        let beacon = BeaconBody {
            ssid: b"other".to_vec(),
            rates: vec![0x82, 0x84],
            channel: Some(6),
            ..BeaconBody::default()
        };

        // Act
        bed.handle(MlmeEvent::RxFrame {
            vdev_id: 0,
            bytes: wlan_mlme_core::encode_frame(&MgmtFrame::new(
                MacAddr::BROADCAST,
                neighbour,
                neighbour,
                MgmtBody::Beacon(beacon),
            ))
            .expect("encode"),
        });

        // Assert
        assert!(bed
            .indications()
            .iter()
            .any(|i| matches!(i, MlmeIndication::BeaconParamsChanged { update, .. } if update.flags.llb_coexist)));
    }
}
