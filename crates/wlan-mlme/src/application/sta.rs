//! Station-role flows: join, authenticate, associate, reassociate, leave.
//!
//! # The station happy path (for beginners)
//!
//! ```text
//!  SME Join ──► WaitJoinBeacon ──beacon──► Joined ──Auth 1──► WaitAuthFrame2
//!                                                                │ Auth 2
//!                    (shared key: Auth 3 ──► WaitAuthFrame4 ──Auth 4)
//!                                                                ▼
//!  LinkEstablished ◄──Assoc Response── WaitAssocRsp ◄──Assoc── Authenticated
//! ```
//!
//! Every waiting state has a failure timer (armed by `enter_mlm`), and the
//! frames that open a wait are retried through the transmit pipeline.  The
//! SME gets exactly one confirmation per step: `JoinCnf`, `AuthCnf`,
//! `AssocCnf`.  A failure after join tears the session down; the SME starts
//! over with a new Join.

use tracing::{debug, info, warn};
use wlan_mlme_core::domain::session::StaAuthContext;
use wlan_mlme_core::domain::state::StateTable;
use wlan_mlme_core::protocol::frames::{
    AssocRequest, AssocResponse, AuthAlgorithm, Authentication, BeaconBody, ReasonCode, StatusCode,
};
use wlan_mlme_core::protocol::wep;
use wlan_mlme_core::{CapabilitySet, MacAddr, MgmtBody, MgmtFrame, MlmState, Session, SessionParams, SessionRef, SmeState};

use crate::application::context::{disconnect_cnf, tx_error_result, MlmeContext};
use crate::application::events::JoinParams;
use crate::application::tx_pipeline::{Continuation, TxClass};
use crate::application::upstream::{MlmeIndication, ResultCode};

/// (Re)Association Request for `session`: our capabilities limited to what
/// the BSS advertised, plus our security elements.
pub(crate) fn sta_assoc_request(session: &Session, current_ap: Option<MacAddr>) -> AssocRequest {
    let caps = match &session.bss_caps {
        Some(bss) => session.self_caps.intersect(bss),
        None => session.self_caps.clone(),
    };
    AssocRequest {
        capability: session.self_caps.capability,
        listen_interval: session.listen_interval,
        current_ap,
        ssid: session.ssid.clone(),
        rates: if caps.rates.is_empty() {
            session.self_caps.rates.clone()
        } else {
            caps.rates
        },
        ht_cap: caps.ht,
        vht_cap: caps.vht,
        he_cap: caps.he,
        rsn: session.security.rsn_ie.clone(),
        wpa: session.security.wpa_ie.clone(),
        ..AssocRequest::default()
    }
}

impl MlmeContext {
    // ── Received frames ──────────────────────────────────────────────────────

    pub(crate) fn sta_on_frame(&mut self, sref: SessionRef, frame: MgmtFrame) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let bssid = session.bssid;
        let state = session.mlm_state();
        let from_bss = frame.header.sa == bssid || frame.header.bssid == bssid;
        let protected = frame.header.protected;
        let sa = frame.header.sa;
        if !from_bss {
            debug!(session = %sref, sa = %sa, "frame from another BSS ignored");
            return;
        }

        match frame.body {
            MgmtBody::Beacon(beacon) | MgmtBody::ProbeResponse(beacon) => {
                if state == MlmState::WaitJoinBeacon {
                    self.sta_joined(sref, &beacon);
                }
            }
            MgmtBody::Authentication(auth) => self.sta_on_auth(sref, auth),
            MgmtBody::AssocResponse(response) => self.sta_on_assoc_response(sref, response),
            MgmtBody::ReassocResponse(response) if state == MlmState::WaitFtReassocRsp => {
                self.ft_on_reassoc_response(sref, response)
            }
            MgmtBody::ReassocResponse(response) => self.sta_on_reassoc_response(sref, response),
            MgmtBody::Deauthentication(body) => self.sta_on_disconnect(sref, body.reason, protected, true),
            MgmtBody::Disassociation(body) => self.sta_on_disconnect(sref, body.reason, protected, false),
            MgmtBody::Action(action) => self.on_action(sref, sa, protected, action),
            other => debug!(session = %sref, subtype = ?other.subtype(), "frame ignored in station role"),
        }
    }

    // ── Join ─────────────────────────────────────────────────────────────────

    pub(crate) fn sta_join(&mut self, params: JoinParams) {
        let bssid = params.bssid;
        if !params.role.is_sta_like() {
            warn!(bssid = %bssid, role = ?params.role, "join requested for a non-station role");
            self.post(MlmeIndication::JoinCnf {
                bssid,
                result: ResultCode::InvalidParameters,
            });
            return;
        }
        let session_params = SessionParams {
            vdev_id: params.vdev_id,
            channel: params.channel,
            max_peers: 1,
            preauth_capacity: self.config.preauth_capacity,
            open_auth_timeout: self.config.open_auth_timeout_ticks,
            protection_cache_size: self.config.protection_cache_size,
            ..SessionParams::new(bssid, params.self_mac, params.role)
        };
        let outcome = match self.sessions.create(session_params) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(bssid = %bssid, error = %e, "join refused");
                self.post(MlmeIndication::JoinCnf {
                    bssid,
                    result: ResultCode::ResourcesUnavailable,
                });
                return;
            }
        };
        let sref = outcome.sref;
        if !outcome.created {
            warn!(session = %sref, bssid = %bssid, "join for a BSS already in use");
            self.post(MlmeIndication::JoinCnf {
                bssid,
                result: ResultCode::InvalidState,
            });
            return;
        }

        let default_listen = self.config.listen_interval;
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        session.ssid = params.ssid;
        session.ch_width_40 = params.ch_width_40;
        session.self_caps = params.caps;
        session.security = params.security;
        session.listen_interval = if params.listen_interval == 0 {
            default_listen
        } else {
            params.listen_interval
        };
        session.sta_auth = Some(StaAuthContext {
            algorithm: params.auth_algorithm,
            challenge: None,
        });
        info!(session = %sref, bssid = %bssid, channel = params.channel, algorithm = ?params.auth_algorithm, "joining");

        self.enter_sme(sref, SmeState::WaitJoin);
        match params.beacon {
            Some(beacon) => self.sta_joined(sref, &beacon),
            None => {
                self.enter_mlm(sref, MlmState::WaitJoinBeacon);
            }
        }
    }

    fn sta_joined(&mut self, sref: SessionRef, beacon: &BeaconBody) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        session.bss_caps = Some(CapabilitySet::from_beacon(beacon));
        session.beacon_interval = beacon.beacon_interval;
        if let Some(channel) = beacon.channel {
            session.channel = channel;
        }
        let bssid = session.bssid;
        if !self.enter_mlm(sref, MlmState::Joined) {
            return;
        }
        self.post(MlmeIndication::JoinCnf {
            bssid,
            result: ResultCode::Success,
        });
        self.sta_start_auth(sref);
    }

    pub(crate) fn sta_join_timeout(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitJoinBeacon {
            return;
        }
        let bssid = session.bssid;
        warn!(session = %sref, bssid = %bssid, "no beacon from BSS");
        self.enter_mlm(sref, MlmState::Idle);
        self.post(MlmeIndication::JoinCnf {
            bssid,
            result: ResultCode::Timeout,
        });
        self.teardown_session(sref);
    }

    // ── Authentication ───────────────────────────────────────────────────────

    fn sta_start_auth(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let algorithm = sta_algorithm(session);
        self.enter_sme(sref, SmeState::WaitAuth);
        if !self.enter_mlm(sref, MlmState::WaitAuthFrame2) {
            return;
        }
        if algorithm == AuthAlgorithm::Sae {
            // The SME drives SAE through SendAuthFrame.
            debug!(session = %sref, "waiting for SME to run SAE");
            return;
        }
        let auth = Authentication::new(algorithm, 1, StatusCode::SUCCESS);
        if let Err(result) = self.sta_send_auth(sref, auth, None) {
            self.rollback_request(sref, true);
            self.sta_post_auth_cnf(sref, result);
        }
    }

    /// Sends a station Authentication frame to the AP, WEP-protected when
    /// `wep_key` is given.
    fn sta_send_auth(
        &mut self,
        sref: SessionRef,
        auth: Authentication,
        wep_key: Option<(Vec<u8>, u8, [u8; 3])>,
    ) -> Result<(), ResultCode> {
        let Some(session) = self.sessions.get(sref) else {
            return Err(ResultCode::InvalidState);
        };
        let mut plan = self
            .tx
            .build(session, session.bssid, TxClass::Auth, MgmtBody::Authentication(auth))
            .with_continuation(Continuation::AwaitResponse);
        if let Some((key, key_id, iv)) = wep_key {
            plan.protect_wep(&key, key_id, iv).map_err(|e| tx_error_result(&e))?;
        }
        self.tx.send(plan).map(|_| ()).map_err(|e| {
            warn!(session = %sref, error = %e, "Authentication frame not sent");
            tx_error_result(&e)
        })
    }

    fn sta_on_auth(&mut self, sref: SessionRef, auth: Authentication) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let state = session.mlm_state();
        let algorithm = sta_algorithm(session);
        let bssid = session.bssid;
        if auth.algorithm != algorithm {
            debug!(session = %sref, got = ?auth.algorithm, expected = ?algorithm, "authentication algorithm mismatch");
            return;
        }
        if algorithm == AuthAlgorithm::Sae {
            if state == MlmState::WaitAuthFrame2 {
                self.post(MlmeIndication::AuthFrameInd {
                    bssid,
                    peer: bssid,
                    frame: auth,
                });
            }
            return;
        }

        match (state, auth.transaction_seq) {
            (MlmState::WaitAuthFrame2, 2) => {
                if !auth.status.is_success() {
                    self.sta_auth_failed(sref, ResultCode::Refused(auth.status));
                } else if algorithm == AuthAlgorithm::SharedKey {
                    self.sta_send_auth3(sref, auth.challenge);
                } else {
                    self.sta_authenticated(sref);
                }
            }
            (MlmState::WaitAuthFrame4, 4) => {
                if auth.status.is_success() {
                    self.sta_authenticated(sref);
                } else {
                    self.sta_auth_failed(sref, ResultCode::Refused(auth.status));
                }
            }
            (state, seq) => debug!(session = %sref, ?state, seq, "authentication frame out of sequence"),
        }
    }

    /// Shared key: echo the challenge in a WEP-encrypted frame 3.
    fn sta_send_auth3(&mut self, sref: SessionRef, challenge: Option<Vec<u8>>) {
        let Some(challenge) = challenge else {
            self.sta_auth_failed(sref, ResultCode::Refused(StatusCode::CHALLENGE_FAILURE));
            return;
        };
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let key_id = session.security.default_key_id;
        let Some(key) = session.security.default_wep_key().map(<[u8]>::to_vec) else {
            warn!(session = %sref, key_id, "no WEP key for shared-key authentication");
            self.sta_auth_failed(sref, ResultCode::InvalidParameters);
            return;
        };
        let iv = wep::iv_from_counter(session.next_wep_iv());
        if let Some(ctx) = session.sta_auth.as_mut() {
            ctx.challenge = Some(challenge.clone());
        }
        if !self.enter_mlm(sref, MlmState::WaitAuthFrame4) {
            return;
        }

        let mut auth = Authentication::new(AuthAlgorithm::SharedKey, 3, StatusCode::SUCCESS);
        auth.challenge = Some(challenge);
        if let Err(result) = self.sta_send_auth(sref, auth, Some((key, key_id, iv))) {
            if result == ResultCode::ResourcesUnavailable {
                self.rollback_request(sref, false);
                self.sta_post_auth_cnf(sref, result);
            } else {
                self.sta_auth_failed(sref, result);
            }
        }
    }

    fn sta_authenticated(&mut self, sref: SessionRef) {
        if !self.enter_mlm(sref, MlmState::Authenticated) {
            return;
        }
        self.sta_post_auth_cnf(sref, ResultCode::Success);
        self.sta_start_assoc(sref);
    }

    fn sta_post_auth_cnf(&mut self, sref: SessionRef, result: ResultCode) {
        if let Some(session) = self.sessions.get(sref) {
            let bssid = session.bssid;
            let algorithm = sta_algorithm(session);
            self.post(MlmeIndication::AuthCnf {
                bssid,
                algorithm,
                result,
            });
        }
    }

    /// Authentication failed (refused, timed out or never acknowledged).
    pub(crate) fn sta_auth_failed(&mut self, sref: SessionRef, result: ResultCode) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let state = session.mlm_state();
        if !matches!(state, MlmState::WaitAuthFrame2 | MlmState::WaitAuthFrame4) {
            debug!(session = %sref, ?state, ?result, "stale authentication failure");
            return;
        }
        warn!(session = %sref, bssid = %session.bssid, ?result, "authentication failed");
        self.enter_mlm(sref, MlmState::AuthRspTimeout);
        self.sta_post_auth_cnf(sref, result);
        self.teardown_session(sref);
    }

    /// The SME finished SAE.
    pub(crate) fn sta_auth_complete(&mut self, sref: SessionRef, status: StatusCode) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitAuthFrame2 {
            debug!(session = %sref, state = ?session.mlm_state(), "auth completion in wrong state");
            return;
        }
        if status.is_success() {
            self.sta_authenticated(sref);
        } else {
            self.sta_auth_failed(sref, ResultCode::Refused(status));
        }
    }

    // ── Association ──────────────────────────────────────────────────────────

    fn sta_start_assoc(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let request = sta_assoc_request(session, None);
        let bssid = session.bssid;
        self.enter_sme(sref, SmeState::WaitAssoc);
        if !self.enter_mlm(sref, MlmState::WaitAssocRsp) {
            return;
        }
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let plan = self
            .tx
            .build(session, bssid, TxClass::Assoc, MgmtBody::AssocRequest(request))
            .with_continuation(Continuation::AwaitResponse);
        if let Err(e) = self.tx.send(plan) {
            warn!(session = %sref, error = %e, "Association Request not sent");
            self.rollback_request(sref, true);
            self.post(MlmeIndication::AssocCnf {
                bssid,
                aid: 0,
                result: tx_error_result(&e),
            });
        }
    }

    /// Records a successful (re)association response: AID, negotiated
    /// capabilities and the AP's peer entry.  Returns the BSSID and AID.
    pub(crate) fn sta_record_association(&mut self, sref: SessionRef, response: &AssocResponse) -> Option<(MacAddr, u16)> {
        let session = self.sessions.get_mut(sref)?;
        let negotiated = session.self_caps.intersect(&CapabilitySet::from_assoc_response(response));
        let bssid = session.bssid;
        let band = session.band();
        let pmf = session.security.pmf_capable && session.security.rsn_ie.is_some();
        let rsn = session.security.rsn_ie.clone();
        let listen_interval = session.listen_interval;
        let algorithm = sta_algorithm(session);
        session.aid = response.aid;
        session.negotiated = Some(negotiated.clone());
        session.peers.remove(&bssid);
        match session.peers.admit(bssid, negotiated, band) {
            Ok(peer) => {
                peer.pmf.enabled = pmf;
                peer.rsn = rsn;
                peer.listen_interval = listen_interval;
                peer.auth_algorithm = algorithm;
            }
            Err(e) => warn!(session = %sref, error = %e, "AP not recorded as peer"),
        }
        Some((bssid, response.aid))
    }

    fn sta_on_assoc_response(&mut self, sref: SessionRef, response: AssocResponse) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitAssocRsp {
            debug!(session = %sref, state = ?session.mlm_state(), "unexpected Association Response");
            return;
        }
        if !response.status.is_success() {
            self.sta_assoc_failed(sref, ResultCode::Refused(response.status));
            return;
        }
        let Some((bssid, aid)) = self.sta_record_association(sref, &response) else {
            return;
        };
        self.enter_mlm(sref, MlmState::LinkEstablished);
        self.enter_sme(sref, SmeState::Associated);
        info!(session = %sref, bssid = %bssid, aid, "associated");
        self.post(MlmeIndication::AssocCnf {
            bssid,
            aid,
            result: ResultCode::Success,
        });
    }

    pub(crate) fn sta_assoc_failed(&mut self, sref: SessionRef, result: ResultCode) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitAssocRsp {
            return;
        }
        let bssid = session.bssid;
        warn!(session = %sref, bssid = %bssid, ?result, "association failed");
        self.post(MlmeIndication::AssocCnf { bssid, aid: 0, result });
        self.teardown_session(sref);
    }

    // ── Reassociation ────────────────────────────────────────────────────────

    pub(crate) fn sta_reassoc(&mut self, bssid: MacAddr) {
        let refuse = |result| MlmeIndication::ReassocCnf { bssid, aid: 0, result };
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "reassociation for unknown BSS");
            self.post(refuse(ResultCode::InvalidParameters));
            return;
        };
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if !session.is_sta() || !session.mlm_state().is_link_up() {
            warn!(session = %sref, state = ?session.mlm_state(), "reassociation without a link");
            self.post(refuse(ResultCode::InvalidState));
            return;
        }
        let request = sta_assoc_request(session, Some(bssid));
        self.enter_sme(sref, SmeState::WaitReassoc);
        if !self.enter_mlm(sref, MlmState::WaitReassocRsp) {
            return;
        }
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let plan = self
            .tx
            .build(session, bssid, TxClass::Reassoc, MgmtBody::ReassocRequest(request))
            .with_continuation(Continuation::AwaitResponse);
        if let Err(e) = self.tx.send(plan) {
            warn!(session = %sref, error = %e, "Reassociation Request not sent");
            self.rollback_request(sref, true);
            self.post(refuse(tx_error_result(&e)));
        }
    }

    fn sta_on_reassoc_response(&mut self, sref: SessionRef, response: AssocResponse) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitReassocRsp {
            debug!(session = %sref, state = ?session.mlm_state(), "unexpected Reassociation Response");
            return;
        }
        if !response.status.is_success() {
            self.sta_reassoc_failed(sref, ResultCode::Refused(response.status));
            return;
        }
        let Some((bssid, aid)) = self.sta_record_association(sref, &response) else {
            return;
        };
        self.enter_mlm(sref, MlmState::Reassociated);
        self.enter_sme(sref, SmeState::Associated);
        info!(session = %sref, bssid = %bssid, aid, "reassociated");
        self.post(MlmeIndication::ReassocCnf {
            bssid,
            aid,
            result: ResultCode::Success,
        });
    }

    pub(crate) fn sta_reassoc_failed(&mut self, sref: SessionRef, result: ResultCode) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitReassocRsp {
            return;
        }
        let bssid = session.bssid;
        warn!(session = %sref, bssid = %bssid, ?result, "reassociation failed");
        self.post(MlmeIndication::ReassocCnf { bssid, aid: 0, result });
        self.teardown_session(sref);
    }

    /// Keys are installed; the link carries data from now on.
    pub(crate) fn sta_set_link_state(&mut self, bssid: MacAddr) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "link state for unknown BSS");
            return;
        };
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if !session.mlm_state().is_link_up() || session.sme_state() != SmeState::Associated {
            debug!(session = %sref, mlm = ?session.mlm_state(), sme = ?session.sme_state(), "link state ignored");
            return;
        }
        self.enter_mlm(sref, MlmState::LinkEstablished);
        self.enter_sme(sref, SmeState::LinkEst);
    }

    // ── Leaving ──────────────────────────────────────────────────────────────

    /// SME-requested deauthentication or disassociation from the AP.
    pub(crate) fn sta_disconnect(&mut self, sref: SessionRef, reason: ReasonCode, deauth: bool) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let bssid = session.bssid;
        let state = session.mlm_state();
        if matches!(state, MlmState::WaitDelStaRsp | MlmState::WaitDelBssRsp) {
            self.post(disconnect_cnf(bssid, bssid, deauth, ResultCode::InvalidState));
            return;
        }
        if !state.allows(MlmState::WaitDelStaRsp) {
            // Not authenticated yet: nothing to tell the AP.
            info!(session = %sref, ?state, "leaving before authentication");
            self.post(disconnect_cnf(bssid, bssid, deauth, ResultCode::Success));
            self.teardown_session(sref);
            return;
        }

        let body = self.disconnect_body(sref, reason, deauth);
        self.enter_sme(sref, if deauth { SmeState::WaitDeauth } else { SmeState::WaitDisassoc });
        self.enter_mlm(sref, MlmState::WaitDelStaRsp);
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let class = if deauth { TxClass::Deauth } else { TxClass::Disassoc };
        let plan = self
            .tx
            .build(session, bssid, class, body)
            .with_continuation(Continuation::FinishDisconnect { deauth });
        if let Err(e) = self.send_disconnect(plan) {
            warn!(session = %sref, error = %e, "disconnect frame not sent");
            self.rollback_request(sref, true);
            self.post(disconnect_cnf(bssid, bssid, deauth, tx_error_result(&e)));
        }
    }

    /// The disconnect frame went out (or its acknowledgment timed out).
    pub(crate) fn sta_finish_disconnect(&mut self, sref: SessionRef, deauth: bool) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if !matches!(session.mlm_state(), MlmState::WaitDelStaRsp | MlmState::WaitDelBssRsp) {
            debug!(session = %sref, state = ?session.mlm_state(), "no disconnect in progress");
            return;
        }
        let bssid = session.bssid;
        self.enter_mlm(sref, MlmState::WaitDelBssRsp);
        self.enter_mlm(sref, MlmState::Idle);
        self.enter_sme(sref, SmeState::Idle);
        info!(session = %sref, bssid = %bssid, deauth, "left BSS");
        self.post(disconnect_cnf(bssid, bssid, deauth, ResultCode::Success));
        self.teardown_session(sref);
    }

    /// The AP deauthenticated or disassociated us.
    fn sta_on_disconnect(&mut self, sref: SessionRef, reason: ReasonCode, protected: bool, deauth: bool) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let bssid = session.bssid;
        let pmf = session.peers.get(&bssid).is_some_and(|p| p.pmf.enabled);
        if pmf && !protected && session.mlm_state().is_link_up() {
            info!(session = %sref, ?reason, "unprotected disconnect on a PMF link, verifying with SA Query");
            self.start_sa_query(sref, bssid);
            return;
        }
        warn!(session = %sref, bssid = %bssid, ?reason, deauth, "disconnected by AP");
        let indication = if deauth {
            MlmeIndication::DeauthInd {
                bssid,
                peer: bssid,
                reason,
            }
        } else {
            MlmeIndication::DisassocInd {
                bssid,
                peer: bssid,
                reason,
            }
        };
        self.enter_mlm(sref, MlmState::Idle);
        self.post(indication);
        self.teardown_session(sref);
    }
}

fn sta_algorithm(session: &Session) -> AuthAlgorithm {
    session
        .sta_auth
        .as_ref()
        .map_or(AuthAlgorithm::OpenSystem, |ctx| ctx.algorithm)
}
