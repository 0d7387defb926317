//! Control-plane bridge: the operations an operator-facing API calls.
//!
//! An HTTP (or any other) front end sits on top of these three functions:
//!
//! - [`list_devices`] – every registered device.
//! - [`get_device`] – one device by id.
//! - [`send_command`] – queue a raw protocol string for a device.
//!
//! # Data Transfer Objects (DTOs)
//!
//! Registry types carry internal details such as the connection id, which
//! means nothing outside this process.  DTOs ([`DeviceDto`], [`AlarmDto`])
//! contain only what an operator needs and derive `Serialize`, so a front end
//! can hand them straight to a JSON encoder.  Where a core type already has
//! the right wire shape ([`DeviceId`], [`Coordinates`], [`AlarmKind`]) the
//! DTO embeds it directly.
//!
//! # `CommandResult<T>` wrapper
//!
//! Every operation returns `CommandResult<T>` rather than `Result<T, E>`, so
//! each response has the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.
//! A device that is not connected is an ordinary `success: false` answer,
//! never a panic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use trackgate_core::protocol::messages::Coordinates;
use trackgate_core::{AlarmKind, DeviceId};

use crate::application::control::send_to_device;
use crate::application::registry::DeviceSession;
use crate::infrastructure::network::GatewayState;

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// One registered device as shown to operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub device_id: DeviceId,
    pub ip: String,
    pub last_seen: DateTime<Utc>,
    /// Signed decimal degrees.
    pub location: Option<Coordinates>,
    pub battery: Option<u8>,
    pub last_alarm: Option<AlarmDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmDto {
    #[serde(rename = "type")]
    pub alarm_type: AlarmKind,
    pub timestamp: DateTime<Utc>,
}

impl From<&DeviceSession> for DeviceDto {
    fn from(s: &DeviceSession) -> Self {
        Self {
            device_id: s.device_id.clone(),
            ip: s.ip.to_string(),
            last_seen: s.last_seen,
            location: s.location,
            battery: s.battery,
            last_alarm: s.last_alarm.as_ref().map(|a| AlarmDto {
                alarm_type: a.kind.clone(),
                timestamp: a.received_at,
            }),
        }
    }
}

/// Unified response wrapper for control-plane operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Operations ────────────────────────────────────────────────────────────────

/// Returns every registered device, sorted by device id.
pub fn list_devices(state: &GatewayState) -> CommandResult<Vec<DeviceDto>> {
    let dtos = state.registry.list_all().iter().map(DeviceDto::from).collect();
    CommandResult::ok(dtos)
}

/// Returns one device, or `success: false` if it is not registered.
pub fn get_device(state: &GatewayState, device_id: &str) -> CommandResult<DeviceDto> {
    match state.registry.lookup_session(&DeviceId::from(device_id)) {
        Some(session) => CommandResult::ok(DeviceDto::from(&session)),
        None => CommandResult::err(format!("device {device_id} not found")),
    }
}

/// Queues `command` verbatim on the connection currently bound to `device_id`.
///
/// The command text is not checked against `device_id`; an operator can send
/// a frame addressed to a different device id.
pub fn send_command(state: &GatewayState, device_id: &str, command: &str) -> CommandResult<()> {
    match send_to_device(
        &state.registry,
        &*state.connections,
        &DeviceId::from(device_id),
        command,
    ) {
        Ok(_) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e.to_string()),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
