//! Storage infrastructure: configuration file persistence.
//!
//! The engine keeps no state on disk.  The only file it reads is the TOML
//! configuration handled by the `config` sub-module:
//!
//! - Reading the file from an explicit path or the platform config directory.
//! - Writing a default file so operators have something to edit.
//! - Falling back to built-in defaults when no file exists.

pub mod config;
