//! Protocol module: stream framing, message types, and the text codec.

pub mod codec;
pub mod frame;
pub mod messages;

pub use codec::{encode_ack, encode_frame, parse_frame, ProtocolError};
pub use frame::{extract, Extraction, Frame, FrameDecoder};
pub use messages::*;
