//! Trackgate server library: the device directory, the per-command reaction
//! table, and the TCP plumbing that connects them to field devices.
//!
//! The binary in `main.rs` is a thin wrapper around
//! [`infrastructure::network::run_server`].

pub mod application;
pub mod infrastructure;
