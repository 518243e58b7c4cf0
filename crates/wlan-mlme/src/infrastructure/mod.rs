//! Infrastructure layer for the MLME engine.
//!
//! Contains the adapters behind the application ports: the radio transmit
//! path, tokio-backed timers and scans, the SME sink, the tick clock, TOML
//! configuration, and the event loop that owns the context.
//!
//! Each port also has a recording or manual adapter here (`RecordingRadio`,
//! `ManualScheduler`, `RecordingScan`, `RecordingUpstream`, `ManualClock`)
//! so flows can be driven deterministically from tests.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `wlan_mlme_core`, but MUST NOT be imported by the `application` or domain
//! layers (the application unit tests borrow the recording adapters, and
//! only under `cfg(test)`).

pub mod clock;
pub mod radio;
pub mod runtime;
pub mod scan;
pub mod storage;
pub mod timer;
pub mod upstream;
