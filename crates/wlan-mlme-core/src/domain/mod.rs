//! Domain entities for the MLME.
//!
//! This module contains pure connection-management logic with no
//! infrastructure dependencies: no radio, no timers, no async runtime.
//!
//! # How the pieces fit together (for beginners)
//!
//! - A [`session::Session`] represents our participation in one BSS, either
//!   as an access point (we *are* the BSS) or as a station (we joined it).
//! - The [`session_table::SessionTable`] owns every session in a bounded
//!   slot map and hands out [`session::SessionRef`] handles.
//! - Each session drives two state machines from [`state`]: the MLM state
//!   (what the MAC is waiting for) and the SME state (what the upper layer
//!   asked for).
//! - AP sessions additionally keep a [`peers::PeerTable`] of associated
//!   stations, a [`preauth::PreAuthRegistry`] of stations that are part-way
//!   through authentication, and a [`protection::ProtectionEngine`] deciding
//!   which legacy-coexistence bits the BSS must advertise.
//!
//! Code in the engine crate depends on the domain, but the domain never
//! depends on the engine.

pub mod capabilities;
pub mod peers;
pub mod preauth;
pub mod protection;
pub mod session;
pub mod session_table;
pub mod state;
