//! # trackgate-core
//!
//! Shared library for the Trackgate device gateway containing the wire
//! protocol framing, the message parser, acknowledgement encoding, and the
//! identifier types used across the server.
//!
//! This crate has zero dependencies on sockets or async runtimes.  Every
//! function here is a pure transformation over bytes and strings, so the whole
//! ingestion pipeline can be tested without a network.
//!
//! # Architecture overview
//!
//! Field trackers (GPS watches, IoT beacons) hold a long-lived TCP connection
//! to the gateway and speak a compact ASCII protocol:
//!
//! ```text
//! [MANUFACTURER*DEVICEID*LENGTHHEX*CONTENT]
//! ```
//!
//! - **`protocol`** – How bytes become messages.  The [`protocol::frame`]
//!   extractor turns an arbitrary chunked byte stream into complete
//!   `[...]` frames; the [`protocol::codec`] parser turns one frame into a
//!   typed [`ParsedMessage`] and builds acknowledgement frames.
//!
//! - **`domain`** – Identifiers ([`ConnectionId`], [`DeviceId`]) and the
//!   configurable [`AlarmCodebook`] that names alarm status bits.

pub mod domain;
pub mod protocol;

pub use domain::alarm::{AlarmCodebook, AlarmKind};
pub use domain::ids::{ConnectionId, DeviceId};
pub use protocol::codec::{encode_ack, encode_frame, parse_frame, ProtocolError};
pub use protocol::frame::{extract, Extraction, Frame, FrameDecoder};
pub use protocol::messages::{CommandTag, ParsedMessage, Payload};
