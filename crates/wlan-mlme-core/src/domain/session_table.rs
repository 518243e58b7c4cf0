//! Bounded slot map of sessions.
//!
//! # Why a slot map? (for beginners)
//!
//! Timers, transmit completions and scan callbacks all arrive *later* and
//! need to find the session they belong to.  Holding a Rust reference across
//! that gap is impossible (the engine mutates the table meanwhile), and
//! holding a bare index is unsafe in a different way: the slot may have been
//! freed and reused for another BSS.
//!
//! [`slab::Slab`] gives stable `usize` keys and reuses freed slots.  Every
//! session also carries a [`SessionId`] from a monotonically increasing
//! generator, and a [`SessionRef`] stores both.  [`SessionTable::get`] only
//! returns the session when the slot still holds the *same* id and the
//! session is still valid.

use slab::Slab;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::session::{Session, SessionId, SessionParams, SessionRef};
use crate::domain::state::{MlmState, TimerId};
use crate::protocol::mac::MacAddr;

/// Default number of concurrent sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Errors returned by [`SessionTable`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session pool exhausted ({max} sessions)")]
    ResourceExhausted { max: usize },

    #[error("session {0} no longer exists")]
    Stale(SessionRef),
}

/// Result of [`SessionTable::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateOutcome {
    pub sref: SessionRef,
    /// False when an existing session for the BSSID was returned.
    pub created: bool,
}

/// Session pool with at most one valid session per BSSID.
#[derive(Debug)]
pub struct SessionTable {
    slots: Slab<Session>,
    next_id: u32,
    max_sessions: usize,
}

impl SessionTable {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            slots: Slab::with_capacity(max_sessions),
            next_id: 1,
            max_sessions,
        }
    }

    /// Creates a session for `params.bssid`, or returns the existing one.
    ///
    /// # Errors
    ///
    /// [`SessionError::ResourceExhausted`] when every slot is taken and no
    /// session for the BSSID exists.
    pub fn create(&mut self, params: SessionParams) -> Result<CreateOutcome, SessionError> {
        if let Some(sref) = self.find_by_bssid(&params.bssid) {
            debug!(session = %sref, bssid = %params.bssid, "session already exists");
            return Ok(CreateOutcome { sref, created: false });
        }
        if self.slots.len() >= self.max_sessions {
            warn!(bssid = %params.bssid, max = self.max_sessions, "session pool exhausted");
            return Err(SessionError::ResourceExhausted {
                max: self.max_sessions,
            });
        }
        let id = self.allocate_id();
        let slot = self.slots.vacant_key();
        let sref = SessionRef { slot, id };
        self.slots.insert(Session::new(sref, &params));
        info!(session = %sref, bssid = %params.bssid, role = ?params.role, vdev = params.vdev_id, "session created");
        Ok(CreateOutcome { sref, created: true })
    }

    fn allocate_id(&mut self) -> SessionId {
        let id = SessionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    // ── Revalidated access ───────────────────────────────────────────────────

    /// The session `sref` refers to, if it still exists.
    pub fn get(&self, sref: SessionRef) -> Option<&Session> {
        self.slots
            .get(sref.slot)
            .filter(|s| s.id() == sref.id && s.is_valid())
    }

    pub fn get_mut(&mut self, sref: SessionRef) -> Option<&mut Session> {
        self.slots
            .get_mut(sref.slot)
            .filter(|s| s.id() == sref.id && s.is_valid())
    }

    /// Like [`get_mut`](Self::get_mut) but as a `Result`.
    ///
    /// # Errors
    ///
    /// [`SessionError::Stale`] when the slot was freed or reused.
    pub fn require_mut(&mut self, sref: SessionRef) -> Result<&mut Session, SessionError> {
        self.get_mut(sref).ok_or(SessionError::Stale(sref))
    }

    /// Removes the session and releases everything it owns.  Returns the
    /// pre-auth timers the caller must cancel.
    ///
    /// # Errors
    ///
    /// [`SessionError::Stale`] when `sref` no longer refers to a session.
    pub fn delete(&mut self, sref: SessionRef) -> Result<Vec<TimerId>, SessionError> {
        if self.get(sref).is_none() {
            return Err(SessionError::Stale(sref));
        }
        let mut session = self.slots.remove(sref.slot);
        let timers = session.release();
        info!(session = %sref, bssid = %session.bssid, "session deleted");
        Ok(timers)
    }

    // ── Finders ──────────────────────────────────────────────────────────────

    fn find(&self, pred: impl Fn(&Session) -> bool) -> Option<SessionRef> {
        self.slots
            .iter()
            .map(|(_, s)| s)
            .find(|s| s.is_valid() && pred(s))
            .map(|s| s.sref)
    }

    pub fn find_by_bssid(&self, bssid: &MacAddr) -> Option<SessionRef> {
        self.find(|s| s.bssid == *bssid)
    }

    pub fn find_by_vdev(&self, vdev_id: u8) -> Option<SessionRef> {
        self.find(|s| s.vdev_id == vdev_id)
    }

    pub fn find_by_vdev_and_state(&self, vdev_id: u8, state: MlmState) -> Option<SessionRef> {
        self.find(|s| s.vdev_id == vdev_id && s.mlm_state() == state)
    }

    /// The session that has `mac` as an associated peer or pending pre-auth.
    pub fn find_by_peer_mac(&self, mac: &MacAddr) -> Option<SessionRef> {
        self.find(|s| s.peers.get(mac).is_some() || s.preauth.search(mac).is_some())
    }

    pub fn find_by_scan_id(&self, scan_id: u32) -> Option<SessionRef> {
        self.find(|s| s.scan_id == Some(scan_id))
    }

    pub fn find_by_session_id(&self, id: SessionId) -> Option<SessionRef> {
        self.find(|s| s.id() == id)
    }

    // ── Introspection ────────────────────────────────────────────────────────

    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|(_, s)| s.is_valid()).count()
    }

    pub fn capacity(&self) -> usize {
        self.max_sessions
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.slots.iter().map(|(_, s)| s).filter(|s| s.is_valid())
    }

    /// Handles of every valid session, for iteration while mutating.
    pub fn refs(&self) -> Vec<SessionRef> {
        self.iter().map(|s| s.sref).collect()
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}
