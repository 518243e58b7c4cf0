//! Application layer of the MLME engine.
//!
//! # What is the "application" layer? (for beginners)
//!
//! The domain crate (`wlan-mlme-core`) knows what a session, a peer, or a
//! protection cache *is*.  This layer decides what to *do* when something
//! happens: a frame arrives, a transmission completes, a timer fires, a scan
//! reaches a channel, or the SME asks for something.
//!
//! Code here:
//!
//! - **Orchestrates** domain objects inside one [`context::MlmeContext`],
//!   which processes exactly one event at a time.
//! - **Depends on abstractions** (the `RadioBackend`, `TimerScheduler`,
//!   `ScanService`, `UpstreamSink` and `Clock` traits) rather than drivers,
//!   so every flow can be unit-tested with recording fakes.
//! - **Contains no I/O**.
//!
//! # Sub-modules
//!
//! - **`context`** – The engine state and the event dispatcher.
//! - **`events`** – Inbound events and SME requests.
//! - **`upstream`** – Confirmations and indications posted to the SME.
//! - **`timers`** – `RetryTimerSet`: at most one armed timer per
//!   (session, class, peer).
//! - **`tx_pipeline`** – Frame building, transmit bookkeeping and resends.
//! - **`sta`** – Station-role join/auth/assoc/disconnect flows.
//! - **`ap`** – AP-role authentication, association and protection flows.
//! - **`ft_handoff`** – 802.11r pre-authentication and fast reassociation.

pub mod ap;
pub mod context;
pub mod events;
pub mod ft_handoff;
pub mod sta;
pub mod timers;
pub mod tx_pipeline;
pub mod upstream;

#[cfg(test)]
pub(crate) mod test_support;
