//! # wlan-mlme-core
//!
//! Shared library for the WLAN MLME engine containing the 802.11 management
//! frame codec, the per-BSS session model, and the pure algorithms that the
//! engine drives (pre-authentication bookkeeping and legacy protection).
//!
//! It has zero dependencies on OS APIs, radio drivers, timers, or async
//! runtimes.  Everything in here can be unit-tested on any host.
//!
//! # Architecture overview
//!
//! The MLME (MAC Sublayer Management Entity) is the part of an 802.11 stack
//! that decides *who* we talk to: it joins a BSS, authenticates, associates,
//! roams, and tears links down again.  This crate holds the building blocks:
//!
//! - **`protocol`** – How management frames look on the air.  The 24-byte
//!   management header, information elements (IEs), typed frame bodies, the
//!   12-bit sequence counter, and shared-key WEP for Authentication frame 3.
//!
//! - **`domain`** – Pure state with no I/O.  The [`Session`] (one per BSS we
//!   take part in), the bounded [`SessionTable`] slot map, the peer table, the
//!   [`PreAuthRegistry`], the [`ProtectionEngine`], and the MLM/SME state
//!   machines with their declared transition tables.
//!
//! The `wlan-mlme` crate wires these into a serialized event-dispatch engine.

pub mod domain;
pub mod protocol;

pub use domain::capabilities::CapabilitySet;
pub use domain::peers::{LegacyClass, Peer, PeerTable};
pub use domain::preauth::{PreAuthNode, PreAuthRegistry};
pub use domain::protection::{BeaconUpdate, HtOperatingMode, ProtectionEngine, ProtectionFlags};
pub use domain::session::{Role, Session, SessionId, SessionParams, SessionRef};
pub use domain::session_table::{CreateOutcome, SessionError, SessionTable};
pub use domain::state::{MlmState, SmeState, StateMachine, TimerClass};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::frames::{MgmtBody, MgmtFrame};
pub use protocol::mac::{MacAddr, MgmtHeader, MgmtSubtype};
