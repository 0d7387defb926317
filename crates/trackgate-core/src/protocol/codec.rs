//! Text codec for the tracker protocol.
//!
//! Wire format:
//! ```text
//! [MANUFACTURER*DEVICEID*LENGTHHEX*CONTENT]
//!                         └─ 4 hex digits: character length of CONTENT
//! CONTENT = TAG[,subfield]*
//! ```
//!
//! Acknowledgements reuse the framing with `CONTENT` set to the tag alone, so
//! a heartbeat from `[CS*123456*0009*LK,0,0,80]` is answered with
//! `[CS*123456*0002*LK]`.

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::warn;

use crate::domain::ids::DeviceId;
use crate::protocol::frame::{FRAME_END, FRAME_START};
use crate::protocol::messages::{
    AlarmReport, CommandTag, Fix, Heartbeat, Hemisphere, LengthMismatch, ParsedMessage, Payload,
    PositionReport,
};

/// Separator between the four top-level fields.
pub const FIELD_SEPARATOR: char = '*';

/// Separator between content subfields.
pub const SUBFIELD_SEPARATOR: char = ',';

/// Number of top-level fields every frame must have.
pub const MIN_FIELDS: usize = 4;

/// Index (after the tag) of the first subfield past the shared location block.
const FIX_FIELDS: usize = 13;

/// Index (after the tag) of the device status word in an alarm report.
const ALARM_STATUS_INDEX: usize = 15;

/// Errors that reject a frame.
///
/// A length mismatch is not among them; see [`ParsedMessage::length_mismatch`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The text does not start with `[` and end with `]`.
    #[error("framing error: message must start with '[' and end with ']'")]
    Framing,

    /// Fewer than four `*`-separated fields.
    #[error("structure error: expected at least {MIN_FIELDS} '*'-separated fields, got {found}")]
    Structure { found: usize },

    /// The length field is not a hexadecimal number.
    #[error("invalid content length field (not hex): {field:?}")]
    LengthField { field: String },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Parses one complete frame, delimiters included.
///
/// # Errors
///
/// Returns [`ProtocolError`] for missing delimiters, too few fields, or a
/// non-hex length field.  Subfields that fail to decode become `None` in the
/// payload instead of failing the frame.
///
/// # Examples
///
/// ```rust
/// use trackgate_core::protocol::codec::parse_frame;
/// use trackgate_core::protocol::messages::{CommandTag, Payload};
///
/// let msg = parse_frame("[CS*123456*0002*LK]").unwrap();
/// assert_eq!(msg.manufacturer, "CS");
/// assert_eq!(msg.device_id.as_str(), "123456");
/// assert_eq!(msg.declared_length, 2);
/// assert_eq!(msg.tag, CommandTag::Heartbeat);
/// assert!(matches!(msg.payload, Payload::Heartbeat(_)));
/// ```
pub fn parse_frame(frame: &str) -> Result<ParsedMessage, ProtocolError> {
    let inner = frame
        .strip_prefix(char::from(FRAME_START))
        .and_then(|rest| rest.strip_suffix(char::from(FRAME_END)))
        .ok_or(ProtocolError::Framing)?;

    // `splitn` keeps any further separators inside the content.
    let fields: Vec<&str> = inner.splitn(MIN_FIELDS, FIELD_SEPARATOR).collect();
    let [manufacturer, device_id, length_field, content] = fields[..] else {
        return Err(ProtocolError::Structure {
            found: fields.len(),
        });
    };

    let declared_length = parse_length_field(length_field)?;
    let actual = content.chars().count();
    let length_mismatch = (declared_length != actual).then(|| {
        warn!(
            "content length mismatch for device {device_id}: declared {declared_length}, actual {actual}: {frame}"
        );
        LengthMismatch {
            declared: declared_length,
            actual,
        }
    });

    let subfields: Vec<&str> = content.split(SUBFIELD_SEPARATOR).collect();
    let (tag_text, rest) = subfields.split_first().map_or(("", &[][..]), |(t, r)| (*t, r));
    let tag = CommandTag::from_tag(tag_text);
    let payload = decode_payload(&tag, rest);

    Ok(ParsedMessage {
        manufacturer: manufacturer.to_string(),
        device_id: DeviceId::from(device_id),
        declared_length,
        content: content.to_string(),
        tag,
        payload,
        length_mismatch,
    })
}

/// Builds a frame around `content`, computing the length field.
///
/// ```rust
/// use trackgate_core::protocol::codec::encode_frame;
///
/// assert_eq!(encode_frame("CS", "123456", "LK"), "[CS*123456*0002*LK]");
/// ```
pub fn encode_frame(manufacturer: &str, device_id: &str, content: &str) -> String {
    format!(
        "[{manufacturer}{FIELD_SEPARATOR}{device_id}{FIELD_SEPARATOR}{:04X}{FIELD_SEPARATOR}{content}]",
        content.chars().count()
    )
}

/// Returns the acknowledgement frame owed for `msg`, if its command needs one.
///
/// The reply mirrors the manufacturer code and device id and carries only the
/// command tag.
pub fn encode_ack(msg: &ParsedMessage) -> Option<String> {
    msg.tag.requires_ack().then(|| {
        encode_frame(
            &msg.manufacturer,
            msg.device_id.as_str(),
            msg.tag.as_str(),
        )
    })
}

// ── Field decoding ────────────────────────────────────────────────────────────

fn parse_length_field(field: &str) -> Result<usize, ProtocolError> {
    let invalid = || ProtocolError::LengthField {
        field: field.to_string(),
    };
    // `from_str_radix` would also accept a leading sign.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(invalid());
    }
    usize::from_str_radix(field, 16).map_err(|_| invalid())
}

fn decode_payload(tag: &CommandTag, rest: &[&str]) -> Payload {
    match tag {
        CommandTag::Heartbeat => Payload::Heartbeat(decode_heartbeat(rest)),
        CommandTag::Position => Payload::Position(decode_position(rest, false)),
        CommandTag::BufferedPosition => Payload::Position(decode_position(rest, true)),
        CommandTag::Alarm => Payload::Alarm(decode_alarm(rest)),
        CommandTag::Other(_) => Payload::Unknown,
    }
}

fn decode_heartbeat(rest: &[&str]) -> Heartbeat {
    Heartbeat {
        steps: field(rest, 0).and_then(parse_u32),
        tumbles: field(rest, 1).and_then(parse_u32),
        battery: field(rest, 2).and_then(parse_battery),
    }
}

fn decode_position(rest: &[&str], buffered: bool) -> PositionReport {
    PositionReport {
        fix: decode_fix(rest),
        buffered,
        extension: tail(rest, FIX_FIELDS),
    }
}

fn decode_alarm(rest: &[&str]) -> AlarmReport {
    AlarmReport {
        fix: decode_fix(rest),
        status: field(rest, ALARM_STATUS_INDEX)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        extension: tail(rest, FIX_FIELDS),
    }
}

/// Decodes `date,time,validity,lat,N/S,lon,E/W,speed,heading,altitude,satellites,signal,battery`.
fn decode_fix(rest: &[&str]) -> Fix {
    Fix {
        timestamp: decode_timestamp(field(rest, 0), field(rest, 1)),
        valid: field(rest, 2).map(str::trim) == Some("A"),
        latitude: field(rest, 3).and_then(parse_f64),
        latitude_hemisphere: field(rest, 4).and_then(|s| Hemisphere::from_letter(s.trim())),
        longitude: field(rest, 5).and_then(parse_f64),
        longitude_hemisphere: field(rest, 6).and_then(|s| Hemisphere::from_letter(s.trim())),
        speed: field(rest, 7).and_then(parse_f64),
        heading: field(rest, 8).and_then(parse_f64),
        altitude: field(rest, 9).and_then(parse_f64),
        satellites: field(rest, 10).and_then(parse_u32),
        signal: field(rest, 11).and_then(parse_u32),
        battery: field(rest, 12).and_then(parse_battery),
    }
}

/// `ddmmyy` + `hhmmss`.
fn decode_timestamp(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let (date, time) = (date?.trim(), time?.trim());
    if date.len() != 6 || time.len() != 6 {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%d%m%y%H%M%S").ok()
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn field<'a>(rest: &[&'a str], index: usize) -> Option<&'a str> {
    rest.get(index).copied()
}

fn tail(rest: &[&str], from: usize) -> Vec<String> {
    rest.get(from..)
        .unwrap_or_default()
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

fn parse_u32(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

fn parse_f64(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_battery(raw: &str) -> Option<u8> {
    raw.trim().trim_end_matches('%').parse().ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    const UD_CONTENT: &str = "UD,220414,134652,A,22.571707,N,113.8613968,E,0.1,0.0,100,7,60,90,1000,50,0000,4,1,460,0,9360,4082,131";

    fn frame_for(content: &str) -> String {
        encode_frame("CS", "8800000015", content)
    }

    // ── Structure ────────────────────────────────────────────────────────────

    #[test]
    fn test_heartbeat_scenario() {
        let msg = parse_frame("[CS*123456*0002*LK]").unwrap();
        assert_eq!(msg.manufacturer, "CS");
        assert_eq!(msg.device_id, DeviceId::from("123456"));
        assert_eq!(msg.declared_length, 2);
        assert_eq!(msg.content, "LK");
        assert_eq!(msg.tag, CommandTag::Heartbeat);
        assert_eq!(msg.payload, Payload::Heartbeat(Heartbeat::default()));
        assert!(msg.length_mismatch.is_none());
    }

    #[test]
    fn test_encoded_frames_parse_back() {
        let contents = [
            "LK",
            "LK,120,3,88",
            "AL",
            "UPLOAD,600",
            "TK,#!AMR\u{1}\u{2}",
            "content*with*stars",
            "",
            "ÜD,ñ",
        ];
        for content in contents {
            let frame = frame_for(content);
            let msg = parse_frame(&frame).unwrap();
            assert_eq!(msg.manufacturer, "CS");
            assert_eq!(msg.device_id.as_str(), "8800000015");
            assert_eq!(msg.declared_length, content.chars().count(), "{content:?}");
            assert_eq!(msg.content, content);
            assert!(msg.length_mismatch.is_none(), "{content:?}");
        }
    }

    #[test]
    fn test_embedded_separator_is_kept_in_content() {
        let msg = parse_frame("[CS*1*0005*A*B*C]").unwrap();
        assert_eq!(msg.content, "A*B*C");
    }

    #[test]
    fn test_length_mismatch_is_reported_not_rejected() {
        let msg = parse_frame("[CS*123456*0005*AL,1,2]").unwrap();
        assert_eq!(
            msg.length_mismatch,
            Some(LengthMismatch {
                declared: 5,
                actual: 6
            })
        );
        assert_eq!(msg.tag, CommandTag::Alarm);
    }

    #[test]
    fn test_length_field_accepts_lowercase_hex() {
        let msg = parse_frame("[CS*1*00a2*LK]").unwrap();
        assert_eq!(msg.declared_length, 0xA2);
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn test_missing_delimiters_is_framing_error() {
        assert_eq!(parse_frame("CS*1*0002*LK]"), Err(ProtocolError::Framing));
        assert_eq!(parse_frame("[CS*1*0002*LK"), Err(ProtocolError::Framing));
        assert_eq!(parse_frame("["), Err(ProtocolError::Framing));
        assert_eq!(parse_frame(""), Err(ProtocolError::Framing));
    }

    #[test]
    fn test_too_few_fields_is_structure_error() {
        assert_eq!(
            parse_frame("[CS*1*0002]"),
            Err(ProtocolError::Structure { found: 3 })
        );
        assert_eq!(parse_frame("[]"), Err(ProtocolError::Structure { found: 1 }));
    }

    #[test]
    fn test_non_hex_length_is_length_field_error() {
        for bad in ["00G2", "", "+002", "-1", " 02"] {
            let frame = format!("[CS*1*{bad}*LK]");
            assert_eq!(
                parse_frame(&frame),
                Err(ProtocolError::LengthField {
                    field: bad.to_string()
                }),
                "{bad:?}"
            );
        }
    }

    // ── Payloads ─────────────────────────────────────────────────────────────

    #[test]
    fn test_heartbeat_with_fields() {
        let msg = parse_frame(&frame_for("LK,5012,3,87%")).unwrap();
        assert_eq!(
            msg.payload,
            Payload::Heartbeat(Heartbeat {
                steps: Some(5012),
                tumbles: Some(3),
                battery: Some(87),
            })
        );
    }

    #[test]
    fn test_heartbeat_with_garbled_fields_still_parses() {
        let msg = parse_frame(&frame_for("LK,x,,")).unwrap();
        assert_eq!(msg.payload, Payload::Heartbeat(Heartbeat::default()));
    }

    #[test]
    fn test_position_decodes_location_block() {
        let msg = parse_frame(&frame_for(UD_CONTENT)).unwrap();
        let Payload::Position(report) = msg.payload else {
            panic!("expected position payload");
        };
        let expected_ts = NaiveDate::from_ymd_opt(2014, 4, 22)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(13, 46, 52).unwrap());
        assert_eq!(report.fix.timestamp, Some(expected_ts));
        assert!(report.fix.valid);
        assert_eq!(report.fix.latitude, Some(22.571707));
        assert_eq!(report.fix.latitude_hemisphere, Some(Hemisphere::North));
        assert_eq!(report.fix.longitude, Some(113.8613968));
        assert_eq!(report.fix.longitude_hemisphere, Some(Hemisphere::East));
        assert_eq!(report.fix.altitude, Some(100.0));
        assert_eq!(report.fix.satellites, Some(7));
        assert_eq!(report.fix.signal, Some(60));
        assert_eq!(report.fix.battery, Some(90));
        assert!(!report.buffered);
        assert_eq!(report.extension.first().map(String::as_str), Some("1000"));
        assert_eq!(report.extension.last().map(String::as_str), Some("131"));
    }

    #[test]
    fn test_buffered_position_is_flagged() {
        let content = UD_CONTENT.replacen("UD,", "UD2,", 1);
        let msg = parse_frame(&frame_for(&content)).unwrap();
        assert_eq!(msg.tag, CommandTag::BufferedPosition);
        assert!(matches!(msg.payload, Payload::Position(PositionReport { buffered: true, .. })));
    }

    #[test]
    fn test_truncated_position_yields_partial_fix() {
        let msg = parse_frame(&frame_for("UD,220414,134652,V")).unwrap();
        let Payload::Position(report) = msg.payload else {
            panic!("expected position payload");
        };
        assert!(report.fix.timestamp.is_some());
        assert!(!report.fix.valid);
        assert!(report.fix.coordinates().is_none());
        assert!(report.extension.is_empty());
    }

    #[test]
    fn test_invalid_date_yields_no_timestamp() {
        let msg = parse_frame(&frame_for("UD,320414,134652,A")).unwrap();
        let Payload::Position(report) = msg.payload else {
            panic!("expected position payload");
        };
        assert!(report.fix.timestamp.is_none());
    }

    #[test]
    fn test_alarm_decodes_status_word() {
        let content = UD_CONTENT.replacen("UD,", "AL,", 1).replace(",0000,", ",00010000,");
        let msg = parse_frame(&frame_for(&content)).unwrap();
        let Payload::Alarm(report) = msg.payload else {
            panic!("expected alarm payload");
        };
        assert_eq!(report.status.as_deref(), Some("00010000"));
        assert!(report.fix.coordinates().is_some());
    }

    #[test]
    fn test_short_alarm_has_no_status() {
        let msg = parse_frame("[CS*123456*0005*AL,1,2]").unwrap();
        let Payload::Alarm(report) = msg.payload else {
            panic!("expected alarm payload");
        };
        assert!(report.status.is_none());
        assert!(report.fix.timestamp.is_none());
    }

    #[test]
    fn test_unknown_tag_gives_unknown_payload() {
        let msg = parse_frame(&frame_for("CONFIG,1")).unwrap();
        assert_eq!(msg.tag, CommandTag::Other("CONFIG".to_string()));
        assert_eq!(msg.payload, Payload::Unknown);
    }

    #[test]
    fn test_non_finite_numbers_are_rejected() {
        let msg = parse_frame(&frame_for("UD,220414,134652,A,nan,N,inf,E")).unwrap();
        let Payload::Position(report) = msg.payload else {
            panic!("expected position payload");
        };
        assert!(report.fix.latitude.is_none());
        assert!(report.fix.longitude.is_none());
    }

    // ── Acknowledgements ─────────────────────────────────────────────────────

    #[test]
    fn test_ack_for_heartbeat_mirrors_identity() {
        let msg = parse_frame("[SG*123456*0009*LK,0,0,80]").unwrap();
        assert_eq!(encode_ack(&msg).as_deref(), Some("[SG*123456*0002*LK]"));
    }

    #[test]
    fn test_ack_for_alarm() {
        let msg = parse_frame("[CS*123456*0005*AL,1,2]").unwrap();
        assert_eq!(encode_ack(&msg).as_deref(), Some("[CS*123456*0002*AL]"));
    }

    #[test]
    fn test_no_ack_for_position_or_unknown() {
        let ud = parse_frame(&frame_for(UD_CONTENT)).unwrap();
        let other = parse_frame(&frame_for("TKQ")).unwrap();
        assert!(encode_ack(&ud).is_none());
        assert!(encode_ack(&other).is_none());
    }

    #[test]
    fn test_encode_frame_uses_uppercase_four_digit_hex() {
        let content = "X".repeat(162);
        let frame = encode_frame("CS", "1", &content);
        assert!(frame.starts_with("[CS*1*00A2*"));
    }
}
