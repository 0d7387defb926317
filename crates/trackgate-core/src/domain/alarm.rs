//! Alarm classification.
//!
//! Alarm frames (`AL`) carry a hexadecimal device status word.  Which bit
//! means what differs between vendors and firmware builds, so the gateway
//! does not hard-code a table: an [`AlarmCodebook`] built from configuration
//! names individual bits, and everything else is reported as
//! [`AlarmKind::Generic`].
//!
//! ```rust
//! use trackgate_core::{AlarmCodebook, AlarmKind};
//!
//! let book = AlarmCodebook::new().with_bit(16, "sos");
//! assert_eq!(book.classify(Some("00010000")), AlarmKind::Named("sos".into()));
//! assert_eq!(book.classify(Some("00000001")), AlarmKind::Generic);
//! assert_eq!(AlarmCodebook::new().classify(Some("00010000")), AlarmKind::Generic);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Label used when no configured bit matches.
pub const GENERIC_ALARM: &str = "GENERIC_ALARM";

/// Highest bit index a 32-bit status word can carry.
pub const MAX_STATUS_BIT: u8 = 31;

/// Classification of one alarm report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum AlarmKind {
    /// No configured bit was set (or no codebook is configured).
    Generic,
    /// Name of the lowest configured bit that was set.
    Named(String),
}

impl AlarmKind {
    pub fn as_str(&self) -> &str {
        match self {
            AlarmKind::Generic => GENERIC_ALARM,
            AlarmKind::Named(name) => name,
        }
    }
}

impl fmt::Display for AlarmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AlarmKind> for String {
    fn from(kind: AlarmKind) -> Self {
        kind.as_str().to_string()
    }
}

impl From<String> for AlarmKind {
    fn from(value: String) -> Self {
        if value == GENERIC_ALARM {
            AlarmKind::Generic
        } else {
            AlarmKind::Named(value)
        }
    }
}

/// Mapping from status-word bit index to alarm type name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmCodebook {
    bits: BTreeMap<u8, String>,
}

impl AlarmCodebook {
    /// An empty codebook: every alarm is classified as generic.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names `bit` (0 = least significant).  Bits above [`MAX_STATUS_BIT`]
    /// can never match and are ignored.
    pub fn with_bit(mut self, bit: u8, name: impl Into<String>) -> Self {
        if bit <= MAX_STATUS_BIT {
            self.bits.insert(bit, name.into());
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Classifies a raw status word (hex text as sent by the device).
    ///
    /// A missing or non-hex status word classifies as generic.
    pub fn classify(&self, status: Option<&str>) -> AlarmKind {
        let Some(word) = status.and_then(parse_status_word) else {
            return AlarmKind::Generic;
        };
        self.bits
            .iter()
            .find(|(bit, _)| word & (1u32 << **bit) != 0)
            .map(|(_, name)| AlarmKind::Named(name.clone()))
            .unwrap_or(AlarmKind::Generic)
    }
}

fn parse_status_word(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.len() > 8 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(trimmed, 16).ok()
}
