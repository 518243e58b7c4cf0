//! 802.11r fast BSS transition: pre-authentication and fast reassociation.
//!
//! # How a fast transition runs (for beginners)
//!
//! A station linked to AP1 wants to move to AP2 without the full
//! authenticate/associate/4-way-handshake round trip.  The SME asks for
//! pre-authentication with AP2:
//!
//! ```text
//!   SME ── FtPreauth(AP2, ch) ──► origin session (AP1, link up)
//!                                   │  scan requested for ch
//!   scan ── ForeignChannel(ch) ────►│  Auth(FT, seq 1) ──► AP2 on ch
//!   AP2 ── Auth(FT, seq 2) ────────►│  target session for AP2 created,
//!                                   │  FT context copied over
//!   SME ◄── FtPreauthRsp ───────────┤
//!                                 target ── FT Reassoc Request ──► AP2
//!   AP2 ── Reassoc Response ──────► target: Reassociated, origin deleted
//! ```
//!
//! Two sessions are involved.  The *origin* keeps the request and the
//! scan id; the *target* is created only once AP2 answered and carries the
//! saved response elements into the Reassociation Request.  The origin
//! stays up until the reassociation succeeds.

use std::time::Duration;

use tracing::{debug, info, warn};
use wlan_mlme_core::domain::session::{FtContext, FtPreauthRequest, RetryClass, StaAuthContext};
use wlan_mlme_core::protocol::frames::{AssocResponse, AuthAlgorithm, Authentication, StatusCode};
use wlan_mlme_core::protocol::ie::{self, id, IeReader, MobilityDomain};
use wlan_mlme_core::{MacAddr, MgmtBody, MgmtFrame, MlmState, SessionId, SessionParams, SessionRef, SmeState, TimerClass};

use crate::application::context::{tx_error_result, MlmeContext};
use crate::application::events::ScanEvent;
use crate::application::sta::sta_assoc_request;
use crate::application::timers::TimerKey;
use crate::application::tx_pipeline::{Continuation, TxClass};
use crate::application::upstream::{MlmeIndication, ResultCode};

// ── Scan boundary ─────────────────────────────────────────────────────────────

/// Off-channel dwell the engine asks the scan service for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    pub requester: SessionId,
    pub channel: u8,
    pub dwell: Duration,
}

/// Runs scans on the engine's behalf.  Progress comes back as
/// `MlmeEvent::Scan` carrying the returned scan id.
#[cfg_attr(test, mockall::automock)]
pub trait ScanService: Send + Sync {
    fn request_scan(&self, request: ScanRequest) -> u32;
}

// ── Pre-authentication ────────────────────────────────────────────────────────

impl MlmeContext {
    pub(crate) fn ft_preauth_request(
        &mut self,
        bssid: MacAddr,
        target_bssid: MacAddr,
        target_channel: u8,
        mde: Option<MobilityDomain>,
        ft_ies: Vec<u8>,
    ) {
        let refuse = |result| MlmeIndication::FtPreauthRsp {
            bssid,
            target: target_bssid,
            result,
            ies: Vec::new(),
        };
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "FT pre-auth for unknown BSS");
            self.post(refuse(ResultCode::InvalidParameters));
            return;
        };
        if target_bssid == bssid {
            self.post(refuse(ResultCode::InvalidParameters));
            return;
        }
        let dwell = self.config.scan_dwell;
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if !session.is_sta() || !session.mlm_state().is_link_up() || session.ft.is_pending() {
            warn!(session = %sref, state = ?session.mlm_state(), pending = session.ft.is_pending(), "FT pre-auth refused");
            self.post(refuse(ResultCode::InvalidState));
            return;
        }

        session.ft = FtContext {
            preauth_req: Some(FtPreauthRequest {
                target_bssid,
                target_channel,
                mde,
                ft_ies,
            }),
            originated_here: true,
            ..FtContext::default()
        };
        let scan_id = self.scan.request_scan(ScanRequest {
            requester: session.id(),
            channel: target_channel,
            dwell,
        });
        session.scan_id = Some(scan_id);
        info!(session = %sref, target = %target_bssid, channel = target_channel, scan_id, "FT pre-authentication started");

        let after = self.config.ft_preauth_timeout;
        self.timers.arm(TimerKey::session(sref, TimerClass::FtPreauthResponse), after);
    }

    pub(crate) fn on_scan_event(&mut self, event: ScanEvent) {
        let Some(sref) = self.sessions.find_by_scan_id(event.scan_id()) else {
            debug!(scan_id = event.scan_id(), "scan event for no session");
            return;
        };
        match event {
            ScanEvent::Started { scan_id } => debug!(session = %sref, scan_id, "scan started"),
            ScanEvent::ForeignChannel { channel, .. } => self.ft_on_foreign_channel(sref, channel),
            ScanEvent::Completed { scan_id } => {
                let Some(session) = self.sessions.get_mut(sref) else {
                    return;
                };
                session.scan_id = None;
                let auth_sent = session.ft.auth_sent;
                debug!(session = %sref, scan_id, auth_sent, "scan completed");
                if !auth_sent && session.ft.is_pending() {
                    self.ft_preauth_failed(sref, ResultCode::Failure);
                }
            }
            ScanEvent::StartFailed { scan_id } => {
                warn!(session = %sref, scan_id, "scan for FT pre-auth did not start");
                self.ft_preauth_failed(sref, ResultCode::Failure);
            }
        }
    }

    fn ft_on_foreign_channel(&mut self, sref: SessionRef, channel: u8) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let Some(req) = session.ft.preauth_req.as_ref() else {
            return;
        };
        if req.target_channel != channel || session.ft.auth_sent {
            return;
        }

        let mut elements = Vec::with_capacity(ie::MobilityDomain::LEN + 2 + req.ft_ies.len());
        if let Some(mde) = &req.mde {
            if let Err(e) = ie::write_element(&mut elements, id::MOBILITY_DOMAIN, &mde.to_bytes()) {
                warn!(session = %sref, error = %e, "MDE not encodable");
                self.ft_preauth_failed(sref, ResultCode::InvalidParameters);
                return;
            }
        }
        elements.extend_from_slice(&req.ft_ies);
        let target = req.target_bssid;

        let mut auth = Authentication::new(AuthAlgorithm::FastTransition, 1, StatusCode::SUCCESS);
        auth.elements = elements;
        let plan = self
            .tx
            .build(session, target, TxClass::FtAuth, MgmtBody::Authentication(auth))
            .with_bssid(target)
            .on_channel(channel)
            .with_continuation(Continuation::AwaitResponse);
        match self.tx.send(plan) {
            Ok(_) => {
                if let Some(session) = self.sessions.get_mut(sref) {
                    session.ft.auth_sent = true;
                }
                info!(session = %sref, target = %target, channel, "FT Authentication frame 1 sent");
            }
            Err(e) => {
                warn!(session = %sref, error = %e, "FT Authentication frame 1 not sent");
                self.ft_preauth_failed(sref, tx_error_result(&e));
            }
        }
    }

    /// Abandons the pre-authentication of origin session `sref`.
    pub(crate) fn ft_preauth_failed(&mut self, sref: SessionRef, result: ResultCode) {
        self.timers.cancel(&TimerKey::session(sref, TimerClass::FtPreauthResponse));
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let Some(req) = session.ft.preauth_req.take() else {
            debug!(session = %sref, "no FT pre-auth pending");
            return;
        };
        let bssid = session.bssid;
        session.ft.clear();
        session.scan_id = None;
        warn!(session = %sref, target = %req.target_bssid, ?result, "FT pre-authentication failed");
        self.post(MlmeIndication::FtPreauthRsp {
            bssid,
            target: req.target_bssid,
            result,
            ies: Vec::new(),
        });
    }

    // ── Authentication frame 2 ───────────────────────────────────────────────

    /// The origin session an FT Authentication frame 2 answers, if any.
    /// These frames carry the target's BSSID, not the origin's, so they are
    /// matched before normal routing.
    pub(crate) fn ft_auth2_origin(&self, frame: &MgmtFrame) -> Option<SessionRef> {
        let MgmtBody::Authentication(auth) = &frame.body else {
            return None;
        };
        if auth.algorithm != AuthAlgorithm::FastTransition || auth.transaction_seq != 2 {
            return None;
        }
        self.sessions
            .iter()
            .find(|s| {
                s.is_sta()
                    && s.self_mac == frame.header.da
                    && s.ft.originated_here
                    && s.ft.auth_sent
                    && s.ft.preauth_req.as_ref().is_some_and(|r| r.target_bssid == frame.header.sa)
            })
            .map(|s| s.sref)
    }

    pub(crate) fn ft_on_auth2(&mut self, origin: SessionRef, auth: Authentication) {
        self.timers.cancel(&TimerKey::session(origin, TimerClass::FtPreauthResponse));
        if !auth.status.is_success() {
            self.ft_preauth_failed(origin, ResultCode::Refused(auth.status));
            return;
        }
        let Some(session) = self.sessions.get_mut(origin) else {
            return;
        };
        let Some(req) = session.ft.preauth_req.clone() else {
            return;
        };
        session.ft.saved_rsp_ies = Some(auth.elements.clone());
        session.scan_id = None;

        let bssid = session.bssid;
        let params = SessionParams {
            vdev_id: session.vdev_id,
            channel: req.target_channel,
            max_peers: 1,
            preauth_capacity: self.config.preauth_capacity,
            open_auth_timeout: self.config.open_auth_timeout_ticks,
            protection_cache_size: self.config.protection_cache_size,
            ..SessionParams::new(req.target_bssid, session.self_mac, session.role)
        };
        let self_caps = session.self_caps.clone();
        let security = session.security.clone();
        let ssid = session.ssid.clone();
        let listen_interval = session.listen_interval;
        let ch_width_40 = session.ch_width_40;

        let target = match self.sessions.create(params) {
            Ok(outcome) => outcome.sref,
            Err(e) => {
                warn!(session = %origin, error = %e, "no session for FT target");
                self.ft_preauth_failed(origin, ResultCode::ResourcesUnavailable);
                return;
            }
        };
        let Some(target_session) = self.sessions.get_mut(target) else {
            return;
        };
        if target_session.mlm_state() != MlmState::Idle {
            warn!(session = %target, state = ?target_session.mlm_state(), "FT target session busy");
            self.ft_preauth_failed(origin, ResultCode::InvalidState);
            return;
        }
        target_session.self_caps = self_caps;
        target_session.security = security;
        target_session.ssid = ssid;
        target_session.listen_interval = listen_interval;
        target_session.ch_width_40 = ch_width_40;
        target_session.sta_auth = Some(StaAuthContext {
            algorithm: AuthAlgorithm::FastTransition,
            challenge: None,
        });
        target_session.ft = FtContext {
            preauth_req: Some(req.clone()),
            saved_rsp_ies: Some(auth.elements.clone()),
            originated_here: false,
            origin: Some(origin),
            auth_sent: true,
        };

        self.enter_mlm(target, MlmState::Joined);
        self.enter_mlm(target, MlmState::Authenticated);
        self.enter_sme(target, SmeState::WaitReassoc);
        info!(origin = %origin, target = %target, target_bssid = %req.target_bssid, "FT pre-authentication complete");
        self.post(MlmeIndication::FtPreauthRsp {
            bssid,
            target: req.target_bssid,
            result: ResultCode::Success,
            ies: auth.elements,
        });
        self.ft_send_reassoc(target);
    }

    // ── Fast reassociation ───────────────────────────────────────────────────

    /// Sends (or resends) the FT Reassociation Request of target session
    /// `sref`, built from the elements AP2 returned.
    fn ft_send_reassoc(&mut self, sref: SessionRef) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let resend = session.mlm_state() == MlmState::WaitFtReassocRsp;
        let saved = session.ft.saved_rsp_ies.clone().unwrap_or_default();
        let (rsn, mde, fte) = ft_elements(&saved);
        let requested_mde = session.ft.preauth_req.as_ref().and_then(|r| r.mde);
        let current_ap = session.ft.origin.and_then(|o| self.sessions.get(o)).map(|s| s.bssid);

        let mut request = sta_assoc_request(session, current_ap);
        request.rsn = rsn.or(request.rsn);
        request.mde = mde.or(requested_mde);
        request.fte = fte;
        let bssid = session.bssid;
        let channel = session.channel;

        if resend {
            self.restart_wait_timer(sref);
        } else {
            if let Some(session) = self.sessions.get_mut(sref) {
                session.retries.reset(RetryClass::FtReassoc);
            }
            if !self.enter_mlm(sref, MlmState::WaitFtReassocRsp) {
                return;
            }
        }
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let plan = self
            .tx
            .build(session, bssid, TxClass::FtReassoc, MgmtBody::ReassocRequest(request))
            .on_channel(channel)
            .with_continuation(Continuation::AwaitResponse);
        if let Err(e) = self.tx.send(plan) {
            warn!(session = %sref, error = %e, "FT Reassociation Request not sent");
            self.ft_reassoc_failed(sref, tx_error_result(&e));
        }
    }

    pub(crate) fn ft_reassoc_timeout(&mut self, sref: SessionRef) {
        let limit = self.config.retry_limit(RetryClass::FtReassoc);
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitFtReassocRsp {
            return;
        }
        if session.retries.try_consume(RetryClass::FtReassoc, limit) {
            info!(session = %sref, retry = session.retries.get(RetryClass::FtReassoc), limit, "FT reassociation retry");
            self.ft_send_reassoc(sref);
        } else {
            self.ft_reassoc_failed(sref, ResultCode::Timeout);
        }
    }

    pub(crate) fn ft_on_reassoc_response(&mut self, sref: SessionRef, response: AssocResponse) {
        if !response.status.is_success() {
            self.ft_reassoc_failed(sref, ResultCode::Refused(response.status));
            return;
        }
        let origin = self.sessions.get(sref).and_then(|s| s.ft.origin);
        let Some((bssid, aid)) = self.sta_record_association(sref, &response) else {
            return;
        };
        self.enter_mlm(sref, MlmState::Reassociated);
        self.enter_sme(sref, SmeState::Associated);
        if let Some(session) = self.sessions.get_mut(sref) {
            session.ft.clear();
        }
        info!(session = %sref, bssid = %bssid, aid, "fast transition complete");
        self.post(MlmeIndication::ReassocCnf {
            bssid,
            aid,
            result: ResultCode::Success,
        });
        if let Some(origin) = origin {
            self.teardown_session(origin);
        }
    }

    /// Fails the fast reassociation of target session `sref`.  The origin
    /// link stays up; only its FT context is dropped.
    pub(crate) fn ft_reassoc_failed(&mut self, sref: SessionRef, result: ResultCode) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        if session.mlm_state() != MlmState::WaitFtReassocRsp {
            debug!(session = %sref, state = ?session.mlm_state(), "stale FT reassociation failure");
            return;
        }
        let bssid = session.bssid;
        let origin = session.ft.origin;
        warn!(session = %sref, bssid = %bssid, ?result, "FT reassociation failed");
        self.post(MlmeIndication::ReassocCnf { bssid, aid: 0, result });
        self.teardown_session(sref);
        if let Some(origin) = origin.and_then(|o| self.sessions.get_mut(o)) {
            origin.ft.clear();
            origin.scan_id = None;
        }
    }
}

/// RSN, MDE and FTE from the elements of an FT Authentication frame 2.
/// Parsing stops at the first malformed element.
fn ft_elements(bytes: &[u8]) -> (Option<Vec<u8>>, Option<MobilityDomain>, Option<Vec<u8>>) {
    let (mut rsn, mut mde, mut fte) = (None, None, None);
    for element in IeReader::new(bytes) {
        let element = match element {
            Ok(element) => element,
            Err(e) => {
                debug!(error = %e, "truncated FT response elements");
                break;
            }
        };
        match element.id {
            id::RSN => rsn = Some(element.body.to_vec()),
            id::MOBILITY_DOMAIN => mde = MobilityDomain::parse(element.body).ok(),
            id::FAST_BSS_TRANSITION => fte = Some(element.body.to_vec()),
            _ => {}
        }
    }
    (rsn, mde, fte)
}
