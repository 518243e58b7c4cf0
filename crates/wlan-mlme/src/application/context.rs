//! MlmeContext: the engine state and its single event dispatcher.
//!
//! # One event at a time (for beginners)
//!
//! Frames, transmit completions, timer expiries, scan progress and SME
//! requests all arrive as [`MlmeEvent`]s.  The context handles exactly one
//! event per [`MlmeContext::handle_event`] call, start to finish, before the
//! next one is looked at.  That is why none of the session state needs a
//! lock: only the task owning the context ever touches it.
//!
//! Anything that completes later (a frame the radio is still sending, a
//! timer still counting down, a scan still running) is remembered by a
//! [`SessionRef`], never by a reference.  When the completion comes back the
//! session is looked up again; if it was deleted in the meantime, the
//! completion is dropped.
//!
//! The role-specific flows live next door in `sta`, `ap` and `ft_handoff`
//! as further `impl MlmeContext` blocks.  This module holds the dispatcher
//! and the helpers those flows share.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use wlan_mlme_core::domain::session::RetryClass;
use wlan_mlme_core::domain::state::TimerId;
use wlan_mlme_core::protocol::frames::{
    ActionFrame, AuthAlgorithm, Authentication, Disconnect, ReasonCode, StatusCode,
};
use wlan_mlme_core::protocol::{decode_body, MgmtSubtype};
use wlan_mlme_core::{
    decode_frame, MacAddr, MgmtBody, MgmtFrame, MlmState, Session, SessionRef, SessionTable, SmeState,
    TimerClass,
};

use crate::application::events::{MlmeEvent, SmeRequest};
use crate::application::ft_handoff::ScanService;
use crate::application::timers::{RetryTimerSet, TimerKey, TimerScheduler};
use crate::application::tx_pipeline::{
    Continuation, FramePlan, FrameTxPipeline, PendingFrame, RadioBackend, TxBuffer, TxClass, TxError, TxStatus,
    TxToken, DEFAULT_MAX_FRAME_LEN,
};
use crate::application::upstream::{MlmeIndication, ResultCode, UpstreamSink};

// ── Configuration ─────────────────────────────────────────────────────────────

/// Limits, timeouts and retry budgets the engine runs with.
///
/// The TOML configuration in `infrastructure::storage::config` converts into
/// this type; tests build it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_sessions: usize,
    pub max_peers: usize,
    pub preauth_capacity: usize,
    /// Age in clock ticks after which an open-system pre-auth node may be
    /// reclaimed.
    pub open_auth_timeout_ticks: u32,
    pub protection_cache_size: usize,
    pub overlap_decay: Duration,

    pub join_timeout: Duration,
    pub auth_timeout: Duration,
    pub assoc_timeout: Duration,
    pub reassoc_timeout: Duration,
    pub ft_preauth_timeout: Duration,
    pub ft_reassoc_timeout: Duration,
    pub auth_frame3_timeout: Duration,
    pub sa_query_timeout: Duration,
    pub disconnect_ack_timeout: Duration,
    pub scan_dwell: Duration,

    pub auth_retry_limit: u8,
    pub sae_retry_limit: u8,
    pub reassoc_retry_limit: u8,
    pub ft_reassoc_retry_limit: u8,
    pub deauth_retry_limit: u8,
    pub sa_query_retry_limit: u8,

    pub listen_interval: u16,
    pub max_frame_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 4,
            max_peers: 32,
            preauth_capacity: 16,
            open_auth_timeout_ticks: 5_000,
            protection_cache_size: 16,
            overlap_decay: Duration::from_secs(30),
            join_timeout: Duration::from_millis(3_000),
            auth_timeout: Duration::from_millis(1_000),
            assoc_timeout: Duration::from_millis(2_000),
            reassoc_timeout: Duration::from_millis(2_000),
            ft_preauth_timeout: Duration::from_millis(1_000),
            ft_reassoc_timeout: Duration::from_millis(1_000),
            auth_frame3_timeout: Duration::from_millis(1_000),
            sa_query_timeout: Duration::from_millis(201),
            disconnect_ack_timeout: Duration::from_millis(1_000),
            scan_dwell: Duration::from_millis(100),
            auth_retry_limit: 3,
            sae_retry_limit: 3,
            reassoc_retry_limit: 3,
            ft_reassoc_retry_limit: 3,
            deauth_retry_limit: 3,
            sa_query_retry_limit: 3,
            listen_interval: 1,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self, class: TimerClass) -> Duration {
        match class {
            TimerClass::JoinFailure => self.join_timeout,
            TimerClass::AuthFailure => self.auth_timeout,
            TimerClass::AssocFailure => self.assoc_timeout,
            TimerClass::ReassocFailure => self.reassoc_timeout,
            TimerClass::FtPreauthResponse => self.ft_preauth_timeout,
            TimerClass::FtReassocFailure => self.ft_reassoc_timeout,
            TimerClass::DisconnectAck => self.disconnect_ack_timeout,
            TimerClass::AuthFrame3 => self.auth_frame3_timeout,
            TimerClass::SaQuery => self.sa_query_timeout,
            TimerClass::OverlapDecay => self.overlap_decay,
        }
    }

    pub fn retry_limit(&self, class: RetryClass) -> u8 {
        match class {
            RetryClass::Auth => self.auth_retry_limit,
            RetryClass::SaeAuth => self.sae_retry_limit,
            RetryClass::Reassoc => self.reassoc_retry_limit,
            RetryClass::FtReassoc => self.ft_reassoc_retry_limit,
            RetryClass::Deauth => self.deauth_retry_limit,
        }
    }
}

// ── Ports ─────────────────────────────────────────────────────────────────────

/// Monotonic 32-bit tick source.  Wraps; consumers use `wrapping_sub`.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now_ticks(&self) -> u32;
}

/// The collaborators the context talks to.
#[derive(Clone)]
pub struct Ports {
    pub radio: Arc<dyn RadioBackend>,
    pub timers: Arc<dyn TimerScheduler>,
    pub scan: Arc<dyn ScanService>,
    pub upstream: Arc<dyn UpstreamSink>,
    pub clock: Arc<dyn Clock>,
}

// ── Context ───────────────────────────────────────────────────────────────────

/// All MLME state of one interface.
pub struct MlmeContext {
    pub(crate) config: EngineConfig,
    pub(crate) sessions: SessionTable,
    pub(crate) tx: FrameTxPipeline,
    pub(crate) timers: RetryTimerSet,
    pub(crate) upstream: Arc<dyn UpstreamSink>,
    pub(crate) scan: Arc<dyn ScanService>,
    pub(crate) clock: Arc<dyn Clock>,
    /// AP-side deauth/disassoc requests waiting for their frame to go out,
    /// keyed by peer; the value says whether it is a deauthentication.
    pub(crate) peer_disconnects: HashMap<(SessionRef, MacAddr), bool>,
    sa_query_seq: u16,
}

impl MlmeContext {
    pub fn new(config: EngineConfig, ports: Ports) -> Self {
        let tx = FrameTxPipeline::new(ports.radio, config.max_frame_len);
        Self {
            sessions: SessionTable::new(config.max_sessions),
            tx,
            timers: RetryTimerSet::new(ports.timers),
            upstream: ports.upstream,
            scan: ports.scan,
            clock: ports.clock,
            peer_disconnects: HashMap::new(),
            sa_query_seq: 0,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    pub fn session_by_bssid(&self, bssid: &MacAddr) -> Option<&Session> {
        self.sessions.find_by_bssid(bssid).and_then(|sref| self.sessions.get(sref))
    }

    pub fn timers(&self) -> &RetryTimerSet {
        &self.timers
    }

    pub fn pending_tx(&self) -> usize {
        self.tx.pending_count()
    }

    /// Processes one event.  Returns `false` once the context has shut down.
    pub fn handle_event(&mut self, event: MlmeEvent) -> bool {
        match event {
            MlmeEvent::RxFrame { vdev_id, bytes } => self.on_rx_frame(vdev_id, &bytes),
            MlmeEvent::TxComplete { token, status, buffer } => self.on_tx_complete(token, status, buffer),
            MlmeEvent::TimerFired(id) => self.on_timer(id),
            MlmeEvent::Scan(event) => self.on_scan_event(event),
            MlmeEvent::Sme(request) => self.on_sme_request(request),
            MlmeEvent::Shutdown => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    /// Deletes every session without posting confirmations.
    pub fn shutdown(&mut self) {
        let refs = self.sessions.refs();
        info!(sessions = refs.len(), "MLME shutting down");
        for sref in refs {
            self.teardown_session(sref);
        }
    }

    // ── Received frames ──────────────────────────────────────────────────────

    fn on_rx_frame(&mut self, vdev_id: u8, bytes: &[u8]) {
        let mut frame = match decode_frame(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(vdev = vdev_id, error = %e, "dropping undecodable frame");
                return;
            }
        };
        // Robust frames reach us already decrypted by the hardware with the
        // protected bit preserved.  Only shared-key Authentication frame 3
        // is WEP-decrypted here.
        let decrypted = match &frame.body {
            MgmtBody::Encrypted { subtype, bytes } if *subtype != MgmtSubtype::Authentication => {
                Some(decode_body(*subtype, bytes))
            }
            _ => None,
        };
        match decrypted {
            Some(Ok(body)) => frame.body = body,
            Some(Err(e)) => {
                debug!(vdev = vdev_id, error = %e, "dropping undecodable protected frame");
                return;
            }
            None => {}
        }

        if let Some(origin) = self.ft_auth2_origin(&frame) {
            if let MgmtBody::Authentication(auth) = frame.body {
                self.ft_on_auth2(origin, auth);
            }
            return;
        }

        let Some(sref) = self.route_rx(vdev_id, &frame) else {
            debug!(vdev = vdev_id, bssid = %frame.header.bssid, subtype = ?frame.header.subtype, "no session for frame");
            return;
        };
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let addressed_to_us = frame.header.da == session.self_mac || frame.header.da.is_multicast();
        if !addressed_to_us {
            debug!(session = %sref, da = %frame.header.da, "frame not addressed to us");
            return;
        }
        let role = session.role;
        if role.is_ap_like() {
            self.ap_on_frame(sref, frame, bytes);
        } else if role.is_sta_like() {
            self.sta_on_frame(sref, frame);
        } else {
            debug!(session = %sref, ?role, "no management handling for role");
        }
    }

    fn route_rx(&self, vdev_id: u8, frame: &MgmtFrame) -> Option<SessionRef> {
        self.sessions
            .find_by_bssid(&frame.header.bssid)
            .filter(|sref| self.sessions.get(*sref).is_some_and(|s| s.vdev_id == vdev_id))
            .or_else(|| self.sessions.find_by_vdev_and_state(vdev_id, MlmState::BssStarted))
            .or_else(|| self.sessions.find_by_vdev(vdev_id))
    }

    // ── Transmit completions ─────────────────────────────────────────────────

    fn on_tx_complete(&mut self, token: TxToken, status: TxStatus, buffer: TxBuffer) {
        let Some(pending) = self.tx.complete(token) else {
            debug!(token = token.0, "completion for an unknown frame");
            return;
        };
        let limit = pending.class.retry_class().map(|rc| self.config.retry_limit(rc));
        let Some(session) = self.sessions.get_mut(pending.sref) else {
            debug!(token = token.0, session = %pending.sref, "completion for a deleted session");
            return;
        };
        if let Some(peer) = session.peers.get_mut(&pending.peer) {
            match status {
                TxStatus::Acked => peer.counters.tx_acked += 1,
                _ => peer.counters.tx_not_acked += 1,
            }
        }

        if status == TxStatus::Acked {
            self.continue_after_tx(&pending);
            return;
        }

        let Some(limit) = limit else {
            debug!(session = %pending.sref, class = ?pending.class, ?status, "frame not acknowledged");
            self.continue_after_tx(&pending);
            return;
        };
        // The budget belongs to this frame: concurrent frames of the same
        // class (deauths to several peers) never share or reset it.
        if pending.attempts < limit {
            if let Some(peer) = session.peers.get_mut(&pending.peer) {
                peer.counters.tx_retries += 1;
            }
            info!(
                session = %pending.sref,
                peer = %pending.peer,
                class = ?pending.class,
                retry = pending.attempts + 1,
                limit,
                "retrying frame"
            );
            let sref = pending.sref;
            let class = pending.class;
            match self.tx.resend(pending.clone(), buffer) {
                Ok(_) => self.restart_wait_timer(sref),
                Err(e) => {
                    warn!(session = %sref, ?class, error = %e, "resend failed");
                    self.on_tx_failure(&pending);
                }
            }
            return;
        }
        warn!(session = %pending.sref, peer = %pending.peer, class = ?pending.class, limit, "retries exhausted");
        self.on_tx_failure(&pending);
    }

    /// A retry-governed frame finally failed.
    fn on_tx_failure(&mut self, pending: &PendingFrame) {
        match pending.class {
            TxClass::Auth => self.sta_auth_failed(pending.sref, ResultCode::TxFailed),
            TxClass::SaeAuth => {
                let Some(session) = self.sessions.get(pending.sref) else {
                    return;
                };
                if session.is_sta() {
                    self.sta_auth_failed(pending.sref, ResultCode::TxFailed);
                } else {
                    let bssid = session.bssid;
                    self.post(MlmeIndication::AuthCnf {
                        bssid,
                        algorithm: AuthAlgorithm::Sae,
                        result: ResultCode::TxFailed,
                    });
                }
            }
            TxClass::Reassoc => self.sta_reassoc_failed(pending.sref, ResultCode::TxFailed),
            TxClass::FtReassoc => self.ft_reassoc_failed(pending.sref, ResultCode::TxFailed),
            _ => self.continue_after_tx(pending),
        }
    }

    fn continue_after_tx(&mut self, pending: &PendingFrame) {
        match pending.continuation {
            Continuation::None | Continuation::AwaitResponse => {}
            Continuation::FinishDisconnect { deauth } => {
                let is_ap = self.sessions.get(pending.sref).is_some_and(|s| s.is_ap());
                if is_ap {
                    self.ap_finish_peer_disconnect(pending.sref, pending.peer);
                } else {
                    self.sta_finish_disconnect(pending.sref, deauth);
                }
            }
            Continuation::FinishStopBss => self.ap_finish_stop_bss(pending.sref),
        }
    }

    // ── Timers ───────────────────────────────────────────────────────────────

    fn on_timer(&mut self, id: TimerId) {
        let Some(key) = self.timers.fired(id) else {
            return;
        };
        let Some(session) = self.sessions.get(key.session) else {
            debug!(timer = id.0, session = %key.session, "timer for a deleted session");
            return;
        };
        let is_ap = session.is_ap();
        debug!(session = %key.session, class = ?key.class, peer = ?key.peer, "timer fired");
        match (key.class, key.peer) {
            (TimerClass::JoinFailure, _) => self.sta_join_timeout(key.session),
            (TimerClass::AuthFailure, _) => self.sta_auth_failed(key.session, ResultCode::Timeout),
            (TimerClass::AssocFailure, _) => self.sta_assoc_failed(key.session, ResultCode::Timeout),
            (TimerClass::ReassocFailure, _) => self.sta_reassoc_failed(key.session, ResultCode::Timeout),
            (TimerClass::FtPreauthResponse, _) => self.ft_preauth_failed(key.session, ResultCode::Timeout),
            (TimerClass::FtReassocFailure, _) => self.ft_reassoc_timeout(key.session),
            (TimerClass::DisconnectAck, Some(peer)) => self.ap_finish_peer_disconnect(key.session, peer),
            (TimerClass::DisconnectAck, None) if is_ap => self.ap_finish_stop_bss(key.session),
            (TimerClass::DisconnectAck, None) => {
                let deauth = self
                    .sessions
                    .get(key.session)
                    .is_some_and(|s| s.sme_state() != SmeState::WaitDisassoc);
                self.sta_finish_disconnect(key.session, deauth);
            }
            (TimerClass::AuthFrame3, Some(peer)) => self.ap_auth_frame3_timeout(key.session, peer),
            (TimerClass::SaQuery, Some(peer)) => self.sa_query_timeout(key.session, peer),
            (TimerClass::OverlapDecay, _) => self.ap_overlap_decay(key.session),
            (class, peer) => debug!(?class, ?peer, "timer without handler"),
        }
    }

    // ── SME requests ─────────────────────────────────────────────────────────

    fn on_sme_request(&mut self, request: SmeRequest) {
        debug!(bssid = %request.bssid(), "SME request");
        match request {
            SmeRequest::Join(params) => self.sta_join(params),
            SmeRequest::StartBss(params) => self.ap_start_bss(params),
            SmeRequest::Reassoc { bssid } => self.sta_reassoc(bssid),
            SmeRequest::SetLinkState { bssid } => self.sta_set_link_state(bssid),
            SmeRequest::Deauth { bssid, peer, reason } => self.disconnect_request(bssid, peer, reason, true),
            SmeRequest::Disassoc { bssid, peer, reason } => self.disconnect_request(bssid, peer, reason, false),
            SmeRequest::StopBss { bssid } => self.ap_stop_bss(bssid),
            SmeRequest::FtPreauth {
                bssid,
                target_bssid,
                target_channel,
                mde,
                ft_ies,
            } => self.ft_preauth_request(bssid, target_bssid, target_channel, mde, ft_ies),
            SmeRequest::SendAuthFrame { bssid, peer, frame } => self.send_auth_frame(bssid, peer, frame),
            SmeRequest::AuthComplete { bssid, peer, status } => self.auth_complete(bssid, peer, status),
            SmeRequest::SendAction { bssid, peer, action } => self.send_action(bssid, peer, action),
            SmeRequest::SetDisconnectIes { bssid, ies } => match self.lookup_mut(bssid) {
                Some(session) => session.disconnect_vendor_ies = ies,
                None => warn!(bssid = %bssid, "disconnect IEs for unknown BSS"),
            },
        }
    }

    fn disconnect_request(&mut self, bssid: MacAddr, peer: MacAddr, reason: ReasonCode, deauth: bool) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "disconnect for unknown BSS");
            self.post(disconnect_cnf(bssid, peer, deauth, ResultCode::InvalidParameters));
            return;
        };
        if self.sessions.get(sref).is_some_and(|s| s.is_ap()) {
            self.ap_disconnect_peer(sref, peer, reason, deauth);
        } else {
            self.sta_disconnect(sref, reason, deauth);
        }
    }

    /// Sends an SME-built SAE frame.
    fn send_auth_frame(&mut self, bssid: MacAddr, peer: MacAddr, frame: Authentication) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "auth frame for unknown BSS");
            return;
        };
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let da = if session.is_ap() { peer } else { session.bssid };
        let algorithm = frame.algorithm;
        let plan = self
            .tx
            .build(session, da, TxClass::SaeAuth, MgmtBody::Authentication(frame))
            .with_continuation(Continuation::AwaitResponse);
        if let Err(e) = self.tx.send(plan) {
            warn!(session = %sref, error = %e, "auth frame not sent");
            self.post(MlmeIndication::AuthCnf {
                bssid,
                algorithm,
                result: tx_error_result(&e),
            });
        }
    }

    fn auth_complete(&mut self, bssid: MacAddr, peer: MacAddr, status: StatusCode) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "auth completion for unknown BSS");
            return;
        };
        if self.sessions.get(sref).is_some_and(|s| s.is_ap()) {
            self.ap_auth_complete(sref, peer, status);
        } else {
            self.sta_auth_complete(sref, status);
        }
    }

    fn send_action(&mut self, bssid: MacAddr, peer: MacAddr, action: ActionFrame) {
        let Some(sref) = self.sessions.find_by_bssid(&bssid) else {
            warn!(bssid = %bssid, "action frame for unknown BSS");
            return;
        };
        if let Err(e) = self.transmit_action(sref, peer, action) {
            warn!(session = %sref, error = %e, "action frame not sent");
        }
    }

    /// Builds and sends an action frame.  Robust frames to a PMF peer are
    /// marked protected; the hardware applies the cipher.
    pub(crate) fn transmit_action(&mut self, sref: SessionRef, peer: MacAddr, action: ActionFrame) -> Result<TxToken, TxError> {
        let Some(session) = self.sessions.get(sref) else {
            return Err(TxError::Radio(format!("session {sref} gone")));
        };
        let protect = action.is_robust() && session.peers.get(&peer).is_some_and(|p| p.pmf.enabled);
        let mut plan = self.tx.build(session, peer, TxClass::Action, MgmtBody::Action(action));
        plan.frame.header.protected = protect;
        self.tx.send(plan)
    }

    // ── Action frames (both roles) ───────────────────────────────────────────

    pub(crate) fn on_action(&mut self, sref: SessionRef, peer: MacAddr, protected: bool, action: ActionFrame) {
        let Some(session) = self.sessions.get(sref) else {
            return;
        };
        let pmf = session.peers.get(&peer).is_some_and(|p| p.pmf.enabled);
        if pmf && action.is_robust() && !protected {
            debug!(session = %sref, peer = %peer, code = ?action.code(), "unprotected robust action frame dropped");
            return;
        }
        let bssid = session.bssid;
        let is_sta = session.is_sta();
        match action {
            ActionFrame::SaQueryRequest { transaction_id } => {
                if let Err(e) = self.transmit_action(sref, peer, ActionFrame::SaQueryResponse { transaction_id }) {
                    warn!(session = %sref, error = %e, "SA Query response not sent");
                }
            }
            ActionFrame::SaQueryResponse { transaction_id } => self.sa_query_response(sref, peer, transaction_id),
            ActionFrame::ChannelSwitch(csa) if is_sta => {
                self.switch_channel(sref, csa.new_channel);
            }
            ActionFrame::ExtChannelSwitch(ecsa) if is_sta => {
                self.switch_channel(sref, ecsa.new_channel);
            }
            ActionFrame::AddbaRequest {
                dialog_token,
                parameters,
                timeout,
                ..
            } => {
                let response = ActionFrame::AddbaResponse {
                    dialog_token,
                    status: StatusCode::SUCCESS,
                    parameters,
                    timeout,
                };
                if let Err(e) = self.transmit_action(sref, peer, response) {
                    warn!(session = %sref, error = %e, "ADDBA response not sent");
                }
            }
            other => self.post(MlmeIndication::ActionFrameInd {
                bssid,
                peer,
                action: other,
            }),
        }
    }

    fn switch_channel(&mut self, sref: SessionRef, channel: u8) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        if session.channel == channel {
            return;
        }
        info!(session = %sref, from = session.channel, to = channel, "channel switch");
        session.channel = channel;
        let bssid = session.bssid;
        self.post(MlmeIndication::ChannelSwitched { bssid, channel });
    }

    // ── SA Query (protected management frames) ───────────────────────────────

    /// Challenges `peer` after an unprotected deauth/disassoc arrived for a
    /// PMF link.  The link survives if the peer answers.
    pub(crate) fn start_sa_query(&mut self, sref: SessionRef, peer: MacAddr) {
        self.sa_query_seq = self.sa_query_seq.wrapping_add(1);
        let transaction_id = self.sa_query_seq;
        let Some(entry) = self.sessions.get_mut(sref).and_then(|s| s.peers.get_mut(&peer)) else {
            return;
        };
        if entry.pmf.sa_query_in_progress {
            debug!(session = %sref, peer = %peer, "SA Query already running");
            return;
        }
        entry.pmf.sa_query_in_progress = true;
        entry.pmf.sa_query_transaction = transaction_id;
        entry.pmf.sa_query_retries = 0;
        info!(session = %sref, peer = %peer, transaction_id, "starting SA Query");
        self.send_sa_query_request(sref, peer, transaction_id);
    }

    fn send_sa_query_request(&mut self, sref: SessionRef, peer: MacAddr, transaction_id: u16) {
        if let Err(e) = self.transmit_action(sref, peer, ActionFrame::SaQueryRequest { transaction_id }) {
            warn!(session = %sref, error = %e, "SA Query request not sent");
        }
        let after = self.config.sa_query_timeout;
        self.timers.arm(TimerKey::peer(sref, TimerClass::SaQuery, peer), after);
    }

    fn sa_query_response(&mut self, sref: SessionRef, peer: MacAddr, transaction_id: u16) {
        let Some(entry) = self.sessions.get_mut(sref).and_then(|s| s.peers.get_mut(&peer)) else {
            return;
        };
        if !entry.pmf.sa_query_in_progress || entry.pmf.sa_query_transaction != transaction_id {
            debug!(session = %sref, peer = %peer, transaction_id, "unexpected SA Query response");
            return;
        }
        entry.pmf.sa_query_in_progress = false;
        entry.pmf.sa_query_retries = 0;
        self.timers.cancel(&TimerKey::peer(sref, TimerClass::SaQuery, peer));
        info!(session = %sref, peer = %peer, "SA Query answered, link kept");
    }

    fn sa_query_timeout(&mut self, sref: SessionRef, peer: MacAddr) {
        let limit = self.config.sa_query_retry_limit;
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let bssid = session.bssid;
        let Some(entry) = session.peers.get_mut(&peer) else {
            return;
        };
        if !entry.pmf.sa_query_in_progress {
            return;
        }
        if entry.pmf.sa_query_retries < limit {
            entry.pmf.sa_query_retries += 1;
            let transaction_id = entry.pmf.sa_query_transaction;
            debug!(session = %sref, peer = %peer, retry = entry.pmf.sa_query_retries, "SA Query retry");
            self.send_sa_query_request(sref, peer, transaction_id);
            return;
        }
        entry.pmf.sa_query_in_progress = false;
        warn!(session = %sref, peer = %peer, "SA Query timed out");
        self.post(MlmeIndication::SaQueryTimeout { bssid, peer });
    }

    // ── Shared helpers ───────────────────────────────────────────────────────

    pub(crate) fn post(&self, indication: MlmeIndication) {
        debug!(?indication, "posting upstream");
        self.upstream.post(indication);
    }

    pub(crate) fn now(&self) -> u32 {
        self.clock.now_ticks()
    }

    pub(crate) fn lookup_mut(&mut self, bssid: MacAddr) -> Option<&mut Session> {
        let sref = self.sessions.find_by_bssid(&bssid)?;
        self.sessions.get_mut(sref)
    }

    /// Moves the MLM machine to `to`, cancelling the old state's wait timer
    /// and arming the new one.  Returns `false` (and changes nothing) for an
    /// undeclared transition.
    pub(crate) fn enter_mlm(&mut self, sref: SessionRef, to: MlmState) -> bool {
        let Some(session) = self.sessions.get_mut(sref) else {
            return false;
        };
        let from = match session.mlm.transition(to) {
            Ok(from) => from,
            Err(e) => {
                warn!(session = %sref, bssid = %session.bssid, error = %e, "MLM transition rejected");
                return false;
            }
        };
        if from == to {
            return true;
        }
        info!(session = %sref, bssid = %session.bssid, ?from, ?to, "MLM state");
        self.swap_wait_timer(sref, from, to);
        true
    }

    pub(crate) fn enter_sme(&mut self, sref: SessionRef, to: SmeState) -> bool {
        let Some(session) = self.sessions.get_mut(sref) else {
            return false;
        };
        match session.sme.transition(to) {
            Ok(from) => {
                if from != to {
                    info!(session = %sref, bssid = %session.bssid, ?from, ?to, "SME state");
                }
                true
            }
            Err(e) => {
                warn!(session = %sref, bssid = %session.bssid, error = %e, "SME transition rejected");
                false
            }
        }
    }

    /// Undoes the transitions of a request that could not be dispatched.
    /// `sme` says whether the request also moved the SME machine.
    pub(crate) fn rollback_request(&mut self, sref: SessionRef, sme: bool) {
        let Some(session) = self.sessions.get_mut(sref) else {
            return;
        };
        let abandoned = session.mlm.rollback();
        if sme {
            session.sme.rollback();
        }
        let restored = session.mlm.current();
        info!(session = %sref, ?abandoned, ?restored, "request rolled back");
        self.swap_wait_timer(sref, abandoned, restored);
    }

    fn swap_wait_timer(&mut self, sref: SessionRef, from: MlmState, to: MlmState) {
        if let Some(class) = from.wait_timer() {
            self.timers.cancel(&TimerKey::session(sref, class));
        }
        if let Some(class) = to.wait_timer() {
            let after = self.config.timeout(class);
            self.timers.arm(TimerKey::session(sref, class), after);
        }
    }

    /// Restarts the wait timer of the current MLM state after a resend.
    pub(crate) fn restart_wait_timer(&mut self, sref: SessionRef) {
        let Some(state) = self.sessions.get(sref).map(|s| s.mlm_state()) else {
            return;
        };
        if let Some(class) = state.wait_timer() {
            let after = self.config.timeout(class);
            self.timers.arm(TimerKey::session(sref, class), after);
        }
    }

    /// Deauthentication/Disassociation body carrying the session's queued
    /// vendor elements.  They stay queued until [`Self::send_disconnect`]
    /// hands the frame to the radio.
    pub(crate) fn disconnect_body(&self, sref: SessionRef, reason: ReasonCode, deauth: bool) -> MgmtBody {
        let vendor = self
            .sessions
            .get(sref)
            .map(|s| s.disconnect_vendor_ies.clone())
            .unwrap_or_default();
        let body = Disconnect { reason, vendor };
        if deauth {
            MgmtBody::Deauthentication(body)
        } else {
            MgmtBody::Disassociation(body)
        }
    }

    /// Sends a disconnect frame built from [`Self::disconnect_body`] and
    /// consumes the queued vendor elements once the radio accepted it.
    pub(crate) fn send_disconnect(&mut self, plan: FramePlan) -> Result<TxToken, TxError> {
        let sref = plan.sref;
        let token = self.tx.send(plan)?;
        if let Some(session) = self.sessions.get_mut(sref) {
            session.disconnect_vendor_ies.clear();
        }
        Ok(token)
    }

    /// Cancels everything the session owns and deletes it.
    pub(crate) fn teardown_session(&mut self, sref: SessionRef) {
        self.timers.cancel_session(sref);
        self.tx.forget_session(sref);
        self.peer_disconnects.retain(|(owner, _), _| *owner != sref);
        if let Some(session) = self.sessions.get_mut(sref) {
            // Offline is reachable from every state.
            let _ = session.mlm.transition(MlmState::Offline);
            let _ = session.sme.transition(SmeState::Offline);
        }
        match self.sessions.delete(sref) {
            Ok(released) => {
                for id in released {
                    self.timers.cancel_id(id);
                }
            }
            Err(e) => debug!(session = %sref, error = %e, "teardown of a session already gone"),
        }
    }
}

/// Maps a transmit error to the result code the SME sees.
pub(crate) fn tx_error_result(error: &TxError) -> ResultCode {
    match error {
        TxError::NoBuffer => ResultCode::ResourcesUnavailable,
        TxError::Encode(_) | TxError::Wep(_) => ResultCode::InvalidParameters,
        TxError::Radio(_) => ResultCode::TxFailed,
    }
}

pub(crate) fn disconnect_cnf(bssid: MacAddr, peer: MacAddr, deauth: bool, result: ResultCode) -> MlmeIndication {
    if deauth {
        MlmeIndication::DeauthCnf { bssid, peer, result }
    } else {
        MlmeIndication::DisassocCnf { bssid, peer, result }
    }
}
