//! Domain types shared by the protocol library and the gateway server.
//!
//! - **`ids`** – Opaque identifiers for connections and devices.
//! - **`alarm`** – The configurable mapping from device status bits to alarm
//!   type names.

pub mod alarm;
pub mod ids;
