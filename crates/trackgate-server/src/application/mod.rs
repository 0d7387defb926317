//! Application layer – transport-independent gateway logic.
//!
//! # Modules
//!
//! - [`registry`] – The live device directory (device id → connection).
//! - [`dispatch`] – What each command type does to the directory and what
//!   acknowledgement goes back to the device.
//! - [`control`] – Routing operator commands to the connection that currently
//!   owns a device id.
//!
//! Nothing here touches sockets; the network layer feeds frames in and writes
//! whatever comes back out.

pub mod control;
pub mod dispatch;
pub mod registry;
