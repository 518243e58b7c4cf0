//! MLM and SME state machines with declared transition tables.
//!
//! # Two state machines per session (for beginners)
//!
//! The **MLM** state tracks what the MAC layer is doing right now: waiting
//! for a beacon, waiting for Authentication frame 2, link up, and so on.  The
//! **SME** state tracks the request the upper layer made: "join this BSS",
//! "disassociate", "run a BSS".  One SME request typically walks the MLM
//! machine through several states.
//!
//! Both machines share [`StateMachine`], which stores the current and
//! previous state and refuses any transition that is not in the table.  A
//! rejected transition is a bug in the caller or an event arriving in the
//! wrong state, never a reason to crash.

use std::fmt::Debug;

use thiserror::Error;

/// A state enum that declares which transitions are legal.
pub trait StateTable: Copy + Eq + Debug {
    /// True when `self -> to` is declared.
    fn allows(self, to: Self) -> bool;
}

/// A transition that the table does not declare.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal transition {from:?} -> {to:?}")]
pub struct IllegalTransition<S: Debug> {
    pub from: S,
    pub to: S,
}

/// Current + previous state with a checked `transition` and `rollback`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateMachine<S> {
    current: S,
    previous: S,
}

impl<S: StateTable> StateMachine<S> {
    pub fn new(initial: S) -> Self {
        Self {
            current: initial,
            previous: initial,
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn previous(&self) -> S {
        self.previous
    }

    /// Moves to `to` if the table allows it, remembering the old state.
    ///
    /// Transitioning to the current state is always accepted and leaves
    /// `previous` untouched.
    ///
    /// # Errors
    ///
    /// Returns [`IllegalTransition`] and leaves the machine unchanged when
    /// the transition is not declared.
    pub fn transition(&mut self, to: S) -> Result<S, IllegalTransition<S>> {
        if to == self.current {
            return Ok(self.current);
        }
        if !self.current.allows(to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }
        let from = self.current;
        self.previous = from;
        self.current = to;
        Ok(from)
    }

    /// Restores the previous state.  Used when a request was accepted but
    /// could not be dispatched (for example, no transmit buffer).
    pub fn rollback(&mut self) -> S {
        let abandoned = self.current;
        self.current = self.previous;
        abandoned
    }
}

// ── Timer classes ─────────────────────────────────────────────────────────────

/// Opaque handle returned by a timer scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

/// Kinds of timers the engine arms.  At most one timer per
/// (session, class, peer) is armed at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerClass {
    JoinFailure,
    AuthFailure,
    AssocFailure,
    ReassocFailure,
    FtPreauthResponse,
    FtReassocFailure,
    /// Waiting for a deauthentication/disassociation to complete.
    DisconnectAck,
    /// AP waiting for Authentication frame 3 from one peer.
    AuthFrame3,
    /// PMF SA-Query waiting for a response from one peer.
    SaQuery,
    /// Periodic reset of overlap protection caches.
    OverlapDecay,
}

// ── MLM ───────────────────────────────────────────────────────────────────────

/// MAC-layer management state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MlmState {
    Offline,
    Idle,
    WaitJoinBeacon,
    Joined,
    BssStarted,
    WaitAuthFrame2,
    /// AP-side per-peer state: challenge sent, waiting for frame 3.
    WaitAuthFrame3,
    WaitAuthFrame4,
    /// AP-side per-peer state: SAE exchange delegated upstream.
    WaitSaeAuth,
    AuthRspTimeout,
    Authenticated,
    WaitAssocRsp,
    WaitReassocRsp,
    WaitFtReassocRsp,
    Reassociated,
    LinkEstablished,
    WaitDelStaRsp,
    WaitDelBssRsp,
}

impl MlmState {
    /// The failure timer armed while the session sits in this state.
    pub fn wait_timer(self) -> Option<TimerClass> {
        match self {
            MlmState::WaitJoinBeacon => Some(TimerClass::JoinFailure),
            MlmState::WaitAuthFrame2 | MlmState::WaitAuthFrame4 => Some(TimerClass::AuthFailure),
            MlmState::WaitAssocRsp => Some(TimerClass::AssocFailure),
            MlmState::WaitReassocRsp => Some(TimerClass::ReassocFailure),
            MlmState::WaitFtReassocRsp => Some(TimerClass::FtReassocFailure),
            MlmState::WaitDelStaRsp | MlmState::WaitDelBssRsp => Some(TimerClass::DisconnectAck),
            _ => None,
        }
    }

    /// A station link is up (frames may flow to the AP).
    pub fn is_link_up(self) -> bool {
        matches!(self, MlmState::LinkEstablished | MlmState::Reassociated)
    }
}

impl StateTable for MlmState {
    fn allows(self, to: Self) -> bool {
        use MlmState::*;
        if to == Offline {
            return true;
        }
        match self {
            Offline => false,
            Idle => matches!(to, WaitJoinBeacon | Joined | BssStarted),
            WaitJoinBeacon => matches!(to, Joined | Idle),
            Joined => matches!(to, WaitAuthFrame2 | Authenticated | Idle),
            BssStarted => matches!(to, WaitDelBssRsp | Idle),
            WaitAuthFrame2 => matches!(to, WaitAuthFrame4 | Authenticated | AuthRspTimeout | Joined | Idle),
            WaitAuthFrame3 => matches!(to, Authenticated | Idle),
            WaitAuthFrame4 => matches!(to, Authenticated | AuthRspTimeout | Joined | Idle),
            WaitSaeAuth => matches!(to, Authenticated | Idle),
            AuthRspTimeout => matches!(to, WaitAuthFrame2 | Joined | Idle | WaitDelBssRsp),
            Authenticated => matches!(
                to,
                WaitAssocRsp | WaitReassocRsp | WaitFtReassocRsp | WaitAuthFrame2 | WaitDelStaRsp | Idle
            ),
            WaitAssocRsp => matches!(to, LinkEstablished | Authenticated | WaitDelStaRsp | Idle),
            WaitReassocRsp => matches!(to, Reassociated | LinkEstablished | WaitDelStaRsp | Idle),
            WaitFtReassocRsp => matches!(to, Reassociated | WaitDelStaRsp | Idle),
            Reassociated => matches!(to, LinkEstablished | WaitReassocRsp | WaitDelStaRsp | Idle),
            LinkEstablished => matches!(to, WaitReassocRsp | WaitDelStaRsp | Idle),
            WaitDelStaRsp => matches!(to, WaitDelBssRsp | Idle),
            WaitDelBssRsp => matches!(to, Idle),
        }
    }
}

// ── SME ───────────────────────────────────────────────────────────────────────

/// Upper-layer request state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmeState {
    Offline,
    Idle,
    WaitJoin,
    WaitAuth,
    WaitAssoc,
    WaitReassoc,
    Associated,
    LinkEst,
    WaitDisassoc,
    WaitDeauth,
    /// An AP session with its BSS running.
    Normal,
}

impl StateTable for SmeState {
    fn allows(self, to: Self) -> bool {
        use SmeState::*;
        if to == Offline {
            return true;
        }
        match self {
            Offline => false,
            Idle => matches!(to, WaitJoin | WaitReassoc | Normal),
            WaitJoin => matches!(to, WaitAuth | WaitDeauth | Idle),
            WaitAuth => matches!(to, WaitAssoc | WaitDeauth | Idle),
            WaitAssoc => matches!(to, Associated | WaitDeauth | WaitDisassoc | Idle),
            WaitReassoc => matches!(to, Associated | WaitDeauth | WaitDisassoc | Idle),
            Associated => matches!(to, LinkEst | WaitReassoc | WaitDeauth | WaitDisassoc | Idle),
            LinkEst => matches!(to, WaitReassoc | WaitDeauth | WaitDisassoc | Idle),
            WaitDisassoc => matches!(to, WaitDeauth | Idle),
            WaitDeauth => matches!(to, Idle),
            Normal => matches!(to, WaitDeauth | Idle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_transition_is_accepted_and_remembers_previous() {
        // Arrange
        let mut sm = StateMachine::new(MlmState::Idle);

        // Act
        let from = sm.transition(MlmState::WaitJoinBeacon).expect("declared");

        // Assert
        assert_eq!(from, MlmState::Idle);
        assert_eq!(sm.current(), MlmState::WaitJoinBeacon);
        assert_eq!(sm.previous(), MlmState::Idle);
    }

    #[test]
    fn test_undeclared_transition_is_rejected_without_mutation() {
        // Arrange
        let mut sm = StateMachine::new(MlmState::Idle);

        // Act
        let err = sm.transition(MlmState::LinkEstablished).unwrap_err();

        // Assert
        assert_eq!(
            err,
            IllegalTransition {
                from: MlmState::Idle,
                to: MlmState::LinkEstablished
            }
        );
        assert_eq!(sm.current(), MlmState::Idle);
    }

    #[test]
    fn test_rollback_restores_previous_state() {
        // Arrange
        let mut sm = StateMachine::new(MlmState::Joined);
        sm.transition(MlmState::WaitAuthFrame2).expect("declared");

        // Act
        let abandoned = sm.rollback();

        // Assert
        assert_eq!(abandoned, MlmState::WaitAuthFrame2);
        assert_eq!(sm.current(), MlmState::Joined);
    }

    #[test]
    fn test_self_transition_is_a_no_op() {
        let mut sm = StateMachine::new(SmeState::Idle);
        sm.transition(SmeState::WaitJoin).expect("declared");
        sm.transition(SmeState::WaitJoin).expect("self");
        assert_eq!(sm.previous(), SmeState::Idle);
    }

    #[test]
    fn test_offline_is_reachable_from_everywhere_and_terminal() {
        let all = [
            MlmState::Idle,
            MlmState::WaitJoinBeacon,
            MlmState::Joined,
            MlmState::BssStarted,
            MlmState::WaitAuthFrame2,
            MlmState::WaitAuthFrame4,
            MlmState::AuthRspTimeout,
            MlmState::Authenticated,
            MlmState::WaitAssocRsp,
            MlmState::WaitReassocRsp,
            MlmState::WaitFtReassocRsp,
            MlmState::Reassociated,
            MlmState::LinkEstablished,
            MlmState::WaitDelStaRsp,
            MlmState::WaitDelBssRsp,
        ];
        for state in all {
            assert!(state.allows(MlmState::Offline), "{state:?} -> Offline");
            assert!(!MlmState::Offline.allows(state), "Offline -> {state:?}");
        }
    }

    #[test]
    fn test_station_happy_path_is_declared() {
        let path = [
            MlmState::Idle,
            MlmState::WaitJoinBeacon,
            MlmState::Joined,
            MlmState::WaitAuthFrame2,
            MlmState::Authenticated,
            MlmState::WaitAssocRsp,
            MlmState::LinkEstablished,
            MlmState::WaitDelStaRsp,
            MlmState::WaitDelBssRsp,
            MlmState::Idle,
        ];
        let mut sm = StateMachine::new(MlmState::Idle);
        for to in &path[1..] {
            sm.transition(*to).unwrap_or_else(|e| panic!("{e}"));
        }
    }

    #[test]
    fn test_wait_states_map_to_timers() {
        assert_eq!(MlmState::WaitAuthFrame2.wait_timer(), Some(TimerClass::AuthFailure));
        assert_eq!(MlmState::WaitAuthFrame4.wait_timer(), Some(TimerClass::AuthFailure));
        assert_eq!(MlmState::WaitFtReassocRsp.wait_timer(), Some(TimerClass::FtReassocFailure));
        assert_eq!(MlmState::LinkEstablished.wait_timer(), None);
    }

    #[test]
    fn test_sme_ap_path() {
        let mut sm = StateMachine::new(SmeState::Idle);
        sm.transition(SmeState::Normal).expect("start bss");
        sm.transition(SmeState::WaitDeauth).expect("stop bss");
        assert!(sm.transition(SmeState::Normal).is_err());
    }
}
