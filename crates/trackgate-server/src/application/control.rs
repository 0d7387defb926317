//! Routing operator commands to devices.
//!
//! The registry knows which connection owns a device id; it does not own the
//! sockets.  [`CommandLink`] is the seam to whatever does (the network layer's
//! connection table in production, a recording fake in tests).

use thiserror::Error;
use tracing::info;

use trackgate_core::{ConnectionId, DeviceId};

use crate::application::registry::DeviceRegistry;

/// Reasons an operator command could not be handed to a device.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("device {0} is not connected")]
    NotConnected(DeviceId),

    /// The registry still lists the connection but its task has exited.
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),

    #[error("outbound queue for connection {0} is full")]
    QueueFull(ConnectionId),

    #[error("command text is empty")]
    EmptyCommand,
}

/// Delivers raw text to one live connection.
///
/// Delivery is fire-and-forget: `Ok` means the text was queued, not that the
/// device received it.
pub trait CommandLink: Send + Sync {
    fn deliver(&self, connection_id: ConnectionId, command: String) -> Result<(), ControlError>;
}

/// Looks up the connection currently bound to `device_id` and queues
/// `command` on it.  Returns the connection the command was queued on.
///
/// `command` is sent verbatim; it is not checked against `device_id`.
///
/// # Errors
///
/// See [`ControlError`].
pub fn send_to_device(
    registry: &DeviceRegistry,
    link: &dyn CommandLink,
    device_id: &DeviceId,
    command: &str,
) -> Result<ConnectionId, ControlError> {
    if command.is_empty() {
        return Err(ControlError::EmptyCommand);
    }
    let connection_id = registry
        .lookup_connection(device_id)
        .ok_or_else(|| ControlError::NotConnected(device_id.clone()))?;
    link.deliver(connection_id, command.to_string())?;
    info!("queued command for device {device_id} on connection {connection_id}");
    Ok(connection_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLink {
        sent: Mutex<Vec<(ConnectionId, String)>>,
    }

    impl CommandLink for RecordingLink {
        fn deliver(&self, connection_id: ConnectionId, command: String) -> Result<(), ControlError> {
            self.sent.lock().unwrap().push((connection_id, command));
            Ok(())
        }
    }

    struct ClosedLink;

    impl CommandLink for ClosedLink {
        fn deliver(&self, connection_id: ConnectionId, _: String) -> Result<(), ControlError> {
            Err(ControlError::ConnectionClosed(connection_id))
        }
    }

    fn registry_with(device: &str) -> (DeviceRegistry, ConnectionId) {
        let registry = DeviceRegistry::new();
        let conn = ConnectionId::new();
        registry.register(&DeviceId::from(device), conn, SocketAddr::from(([127, 0, 0, 1], 9)));
        (registry, conn)
    }

    #[test]
    fn test_send_routes_to_registered_connection() {
        // Arrange
        let (registry, conn) = registry_with("123456");
        let link = RecordingLink::default();

        // Act
        let result = send_to_device(&registry, &link, &DeviceId::from("123456"), "[CS*123456*0004*CR]");

        // Assert
        assert_eq!(result, Ok(conn));
        assert_eq!(
            *link.sent.lock().unwrap(),
            vec![(conn, "[CS*123456*0004*CR]".to_string())]
        );
    }

    #[test]
    fn test_send_to_unknown_device_fails_without_delivery() {
        let (registry, _) = registry_with("1");
        let link = RecordingLink::default();

        let result = send_to_device(&registry, &link, &DeviceId::from("2"), "[CS*2*0002*CR]");

        assert_eq!(result, Err(ControlError::NotConnected(DeviceId::from("2"))));
        assert!(link.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_send_reports_closed_connection() {
        let (registry, conn) = registry_with("1");

        let result = send_to_device(&registry, &ClosedLink, &DeviceId::from("1"), "x");

        assert_eq!(result, Err(ControlError::ConnectionClosed(conn)));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        let (registry, _) = registry_with("1");

        let result = send_to_device(&registry, &RecordingLink::default(), &DeviceId::from("1"), "");

        assert_eq!(result, Err(ControlError::EmptyCommand));
    }
}
