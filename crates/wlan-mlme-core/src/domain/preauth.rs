//! Registry of stations part-way through authentication with an AP session.
//!
//! # Why a separate registry? (for beginners)
//!
//! A station must authenticate before it may associate.  Between
//! Authentication frame 1 and the (Re)Association Request, the AP has to
//! remember the station: which algorithm it used, whether the shared-key
//! challenge is outstanding, and for SAE whether an association request
//! arrived before the SME finished the handshake.
//!
//! The registry is bounded.  When it is full, nodes that completed
//! open-system authentication but never associated become reclaimable after
//! `open_auth_timeout` ticks; [`PreAuthRegistry::reap_stale`] frees them.
//!
//! Ticks are a wrapping 32-bit monotonic counter, so ages are computed with
//! `wrapping_sub`: a node created at `u32::MAX - 5` is 10 ticks old at 4.

use std::collections::VecDeque;

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::state::{MlmState, TimerId};
use crate::protocol::frames::AuthAlgorithm;
use crate::protocol::mac::MacAddr;

/// Errors returned by [`PreAuthRegistry::add`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreAuthError {
    #[error("pre-authentication registry full ({max} nodes)")]
    Full { max: usize },

    #[error("peer {0} already has a pre-authentication node")]
    Duplicate(MacAddr),
}

/// One station that has started, but not finished, joining the BSS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthNode {
    pub peer: MacAddr,
    pub auth_type: AuthAlgorithm,
    /// `WaitAuthFrame3`, `WaitSaeAuth`, or `Authenticated`.
    pub state: MlmState,
    /// Monotonic tick at creation.
    pub created_at: u32,
    /// Timer armed on behalf of this node, if any.
    pub timer: Option<TimerId>,
    /// Shared-key challenge text sent in frame 2.
    pub challenge: Option<Vec<u8>>,
    /// Raw (Re)Association Request received before SAE completed.
    pub deferred_assoc_req: Option<Vec<u8>>,
}

impl PreAuthNode {
    pub fn new(peer: MacAddr, auth_type: AuthAlgorithm, state: MlmState, now: u32) -> Self {
        Self {
            peer,
            auth_type,
            state,
            created_at: now,
            timer: None,
            challenge: None,
            deferred_assoc_req: None,
        }
    }

    fn is_stale_open_auth(&self, now: u32, timeout: u32) -> bool {
        self.auth_type == AuthAlgorithm::OpenSystem
            && self.state == MlmState::Authenticated
            && now.wrapping_sub(self.created_at) > timeout
    }
}

/// Bounded, most-recent-first list of [`PreAuthNode`]s.
#[derive(Debug, Clone)]
pub struct PreAuthRegistry {
    nodes: VecDeque<PreAuthNode>,
    count: usize,
    max: usize,
    open_auth_timeout: u32,
    released_timers: Vec<TimerId>,
}

impl PreAuthRegistry {
    pub fn new(max: usize, open_auth_timeout: u32) -> Self {
        Self {
            nodes: VecDeque::new(),
            count: 0,
            max,
            open_auth_timeout,
            released_timers: Vec::new(),
        }
    }

    /// Prepends `node`.
    ///
    /// # Errors
    ///
    /// [`PreAuthError::Full`] when at capacity (call
    /// [`reap_stale`](Self::reap_stale) first), [`PreAuthError::Duplicate`]
    /// when the peer already has a node.
    pub fn add(&mut self, node: PreAuthNode) -> Result<(), PreAuthError> {
        if self.search(&node.peer).is_some() {
            return Err(PreAuthError::Duplicate(node.peer));
        }
        if self.is_full() {
            return Err(PreAuthError::Full { max: self.max });
        }
        self.nodes.push_front(node);
        self.count += 1;
        Ok(())
    }

    pub fn search(&self, peer: &MacAddr) -> Option<&PreAuthNode> {
        self.nodes.iter().find(|n| n.peer == *peer)
    }

    pub fn search_mut(&mut self, peer: &MacAddr) -> Option<&mut PreAuthNode> {
        self.nodes.iter_mut().find(|n| n.peer == *peer)
    }

    /// Removes the node for `peer`, queueing its timer for cancellation and
    /// freeing any deferred association request.
    pub fn delete(&mut self, peer: &MacAddr) -> Option<PreAuthNode> {
        let Some(idx) = self.nodes.iter().position(|n| n.peer == *peer) else {
            debug!(peer = %peer, "no pre-auth node to delete");
            return None;
        };
        let mut node = self.nodes.remove(idx)?;
        self.count -= 1;
        self.release(&mut node);
        Some(node)
    }

    /// Frees every open-system node that authenticated more than
    /// `open_auth_timeout` ticks ago.  Returns whether anything was freed.
    pub fn reap_stale(&mut self, now: u32) -> bool {
        let timeout = self.open_auth_timeout;
        let before = self.count;
        let mut kept = VecDeque::with_capacity(self.nodes.len());
        for mut node in self.nodes.drain(..) {
            if node.is_stale_open_auth(now, timeout) {
                debug!(peer = %node.peer, age = now.wrapping_sub(node.created_at), "reaping stale pre-auth node");
                if let Some(timer) = node.timer.take() {
                    self.released_timers.push(timer);
                }
            } else {
                kept.push_back(node);
            }
        }
        self.nodes = kept;
        self.count = self.nodes.len();
        let freed = before - self.count;
        if freed == 0 {
            warn!(count = self.count, "pre-auth registry full and nothing reclaimable");
        }
        freed > 0
    }

    /// Timers of deleted nodes that the caller must cancel.
    pub fn take_released_timers(&mut self) -> Vec<TimerId> {
        std::mem::take(&mut self.released_timers)
    }

    /// Deletes every node (session teardown).
    pub fn clear(&mut self) {
        let nodes: Vec<_> = self.nodes.drain(..).collect();
        for mut node in nodes {
            self.release(&mut node);
        }
        self.count = 0;
    }

    fn release(&mut self, node: &mut PreAuthNode) {
        if let Some(timer) = node.timer.take() {
            self.released_timers.push(timer);
        }
        node.deferred_assoc_req = None;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.count >= self.max
    }

    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreAuthNode> {
        self.nodes.iter()
    }
}
