//! Typed representation of tracker protocol messages.
//!
//! Every frame carries a command tag as the first comma-separated subfield of
//! its content.  The tags handled by the gateway are:
//!
//! | Tag   | Meaning                               | Acknowledged |
//! |-------|---------------------------------------|--------------|
//! | `LK`  | Link keep-alive (heartbeat)           | yes          |
//! | `UD`  | Position upload                       | no           |
//! | `UD2` | Buffered (blind-spot) position upload | no           |
//! | `AL`  | Alarm report                          | yes          |
//!
//! Any other tag parses as [`Payload::Unknown`].

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::ids::DeviceId;

pub const TAG_HEARTBEAT: &str = "LK";
pub const TAG_POSITION: &str = "UD";
pub const TAG_BUFFERED_POSITION: &str = "UD2";
pub const TAG_ALARM: &str = "AL";

// ── Command tags ──────────────────────────────────────────────────────────────

/// Command type carried in the first content subfield.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTag {
    Heartbeat,
    Position,
    BufferedPosition,
    Alarm,
    /// Any tag the gateway does not interpret; the raw text is kept.
    Other(String),
}

impl CommandTag {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            TAG_HEARTBEAT => CommandTag::Heartbeat,
            TAG_POSITION => CommandTag::Position,
            TAG_BUFFERED_POSITION => CommandTag::BufferedPosition,
            TAG_ALARM => CommandTag::Alarm,
            other => CommandTag::Other(other.to_string()),
        }
    }

    /// The tag exactly as it appears on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            CommandTag::Heartbeat => TAG_HEARTBEAT,
            CommandTag::Position => TAG_POSITION,
            CommandTag::BufferedPosition => TAG_BUFFERED_POSITION,
            CommandTag::Alarm => TAG_ALARM,
            CommandTag::Other(tag) => tag,
        }
    }

    /// Whether the device expects the gateway to echo this command back.
    ///
    /// Devices retransmit unacknowledged alarms indefinitely.
    pub fn requires_ack(&self) -> bool {
        matches!(self, CommandTag::Heartbeat | CommandTag::Alarm)
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Parsed message ────────────────────────────────────────────────────────────

/// Declared and actual content length disagree.
///
/// Reported, never fatal: devices in the field disagree about the unit of the
/// length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    pub declared: usize,
    pub actual: usize,
}

/// One fully parsed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    /// Manufacturer code, e.g. `CS` or `SG`.
    pub manufacturer: String,
    pub device_id: DeviceId,
    /// Content length as declared by the hex length field.
    pub declared_length: usize,
    /// Everything after the third `*`, verbatim.
    pub content: String,
    pub tag: CommandTag,
    pub payload: Payload,
    /// Set when `declared_length` differs from the content's character count.
    pub length_mismatch: Option<LengthMismatch>,
}

/// Decoded, command-specific part of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Heartbeat(Heartbeat),
    Position(PositionReport),
    Alarm(AlarmReport),
    /// Unrecognised tag; see [`ParsedMessage::tag`].
    Unknown,
}

/// `LK[,steps,tumbles,battery]`.  A bare `LK` carries none of the fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heartbeat {
    pub steps: Option<u32>,
    pub tumbles: Option<u32>,
    /// Battery percentage.
    pub battery: Option<u8>,
}

/// Hemisphere letter following a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hemisphere {
    North,
    South,
    East,
    West,
}

impl Hemisphere {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "N" => Some(Hemisphere::North),
            "S" => Some(Hemisphere::South),
            "E" => Some(Hemisphere::East),
            "W" => Some(Hemisphere::West),
            _ => None,
        }
    }

    /// Sign applied to an unsigned coordinate in this hemisphere.
    pub fn sign(self) -> f64 {
        match self {
            Hemisphere::North | Hemisphere::East => 1.0,
            Hemisphere::South | Hemisphere::West => -1.0,
        }
    }
}

/// Signed decimal-degree coordinates.
///
/// Serialized as `{ "lat": .., "lon": .. }`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lon")]
    pub longitude: f64,
}

/// Location block shared by position and alarm reports.
///
/// Subfield layout after the tag:
/// `date,time,validity,lat,N/S,lon,E/W,speed,heading,altitude,satellites,signal,battery`.
/// Any subfield that is missing or does not parse is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fix {
    /// Device-local time of the fix (`ddmmyy` + `hhmmss`).
    pub timestamp: Option<NaiveDateTime>,
    /// `true` when the validity flag is `A`.
    pub valid: bool,
    /// Latitude as sent, unsigned.
    pub latitude: Option<f64>,
    pub latitude_hemisphere: Option<Hemisphere>,
    /// Longitude as sent, unsigned.
    pub longitude: Option<f64>,
    pub longitude_hemisphere: Option<Hemisphere>,
    pub speed: Option<f64>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub satellites: Option<u32>,
    pub signal: Option<u32>,
    pub battery: Option<u8>,
}

impl Fix {
    /// Latitude and longitude with hemispheres applied.
    ///
    /// Both coordinates must be present; a missing hemisphere counts as
    /// north/east.
    pub fn coordinates(&self) -> Option<Coordinates> {
        let lat = self.latitude?;
        let lon = self.longitude?;
        let lat_sign = self.latitude_hemisphere.map_or(1.0, Hemisphere::sign);
        let lon_sign = self.longitude_hemisphere.map_or(1.0, Hemisphere::sign);
        Some(Coordinates {
            latitude: lat * lat_sign,
            longitude: lon * lon_sign,
        })
    }
}

/// `UD`/`UD2` telemetry upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionReport {
    pub fix: Fix,
    /// `true` for `UD2`: a fix recorded while offline and uploaded later.
    pub buffered: bool,
    /// Subfields after the battery (steps, tumbles, status word, cell and
    /// Wi-Fi assist blocks) kept undecoded.
    pub extension: Vec<String>,
}

/// `AL` alarm report.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlarmReport {
    pub fix: Fix,
    /// Hexadecimal device status word, as sent.
    pub status: Option<String>,
    /// Subfields after the status word, kept undecoded.
    pub extension: Vec<String>,
}
