//! Infrastructure layer for the gateway.
//!
//! Contains the OS-facing adapters: TCP sockets, configuration files, and the
//! in-process control-plane boundary.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `trackgate_core`, but MUST NOT be imported by the `application` layer.

pub mod control_bridge;
pub mod network;
pub mod storage;
