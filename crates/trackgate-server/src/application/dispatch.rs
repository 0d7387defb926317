//! Dispatcher: the per-command reaction table.
//!
//! | Command       | Registry effect                               | Reply          |
//! |---------------|-----------------------------------------------|----------------|
//! | `LK`          | register, refresh last-seen and battery       | `[M*ID*0002*LK]` |
//! | `UD` / `UD2`  | register, refresh last-seen, location, battery | none           |
//! | `AL`          | register, record the alarm                    | `[M*ID*0002*AL]` |
//! | anything else | none                                          | none           |
//!
//! The dispatcher is synchronous and never touches a socket: it receives one
//! frame and hands back the acknowledgement text the caller should write.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use trackgate_core::protocol::messages::{AlarmReport, Heartbeat, PositionReport};
use trackgate_core::{
    encode_ack, parse_frame, AlarmCodebook, ConnectionId, DeviceId, Frame, ParsedMessage,
    Payload,
};

use crate::application::registry::{AlarmRecord, DeviceRegistry, SessionUpdate};

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    pub connection_id: ConnectionId,
    pub peer: SocketAddr,
}

/// Result of dispatching one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reaction {
    /// Device the frame was attributed to, when it registered one.
    pub device_id: Option<DeviceId>,
    /// Acknowledgement frame to write back on the same connection.
    pub ack: Option<String>,
}

pub struct Dispatcher {
    registry: Arc<DeviceRegistry>,
    codebook: AlarmCodebook,
}

impl Dispatcher {
    pub fn new(registry: Arc<DeviceRegistry>, codebook: AlarmCodebook) -> Self {
        Self { registry, codebook }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// Parses `frame` and dispatches it.
    ///
    /// A frame that fails to parse is logged and yields an empty reaction;
    /// it has no effect on any other frame.
    pub fn handle_frame(&self, origin: &Origin, frame: &Frame) -> Reaction {
        let text = frame.to_text();
        debug!("connection {} ← {text}", origin.connection_id);
        match parse_frame(&text) {
            Ok(msg) => self.dispatch(origin, &msg),
            Err(e) => {
                warn!(
                    "connection {}: dropping unparseable frame {text:?}: {e}",
                    origin.connection_id
                );
                Reaction::default()
            }
        }
    }

    /// Applies the reaction table to one parsed message.
    pub fn dispatch(&self, origin: &Origin, msg: &ParsedMessage) -> Reaction {
        if matches!(msg.payload, Payload::Unknown) {
            warn!(
                "device {}: unknown command {:?} ignored",
                msg.device_id, msg.tag
            );
            return Reaction::default();
        }

        let update = match &msg.payload {
            Payload::Heartbeat(hb) => heartbeat_update(hb),
            Payload::Position(report) => position_update(report),
            Payload::Alarm(report) => self.alarm_update(&msg.device_id, report),
            Payload::Unknown => SessionUpdate::default(),
        };
        self.registry.register_and_update(
            &msg.device_id,
            origin.connection_id,
            origin.peer,
            update,
        );

        let ack = encode_ack(msg);
        if let Some(ack) = &ack {
            debug!("connection {} → {ack}", origin.connection_id);
        }
        Reaction {
            device_id: Some(msg.device_id.clone()),
            ack,
        }
    }

    fn alarm_update(&self, device_id: &DeviceId, report: &AlarmReport) -> SessionUpdate {
        let kind = self.codebook.classify(report.status.as_deref());
        info!("device {device_id}: alarm {kind}");
        let now = Utc::now();
        SessionUpdate {
            last_seen: Some(now),
            location: None,
            battery: None,
            last_alarm: Some(AlarmRecord {
                kind,
                received_at: now,
            }),
        }
    }
}

fn heartbeat_update(hb: &Heartbeat) -> SessionUpdate {
    SessionUpdate {
        battery: hb.battery,
        ..SessionUpdate::seen_at(Utc::now())
    }
}

fn position_update(report: &PositionReport) -> SessionUpdate {
    SessionUpdate {
        location: report.fix.coordinates(),
        battery: report.fix.battery,
        ..SessionUpdate::seen_at(Utc::now())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use trackgate_core::AlarmKind;

    fn setup(codebook: AlarmCodebook) -> (Dispatcher, Arc<DeviceRegistry>, Origin) {
        let registry = Arc::new(DeviceRegistry::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), codebook);
        let origin = Origin {
            connection_id: ConnectionId::new(),
            peer: SocketAddr::from(([192, 168, 1, 20], 51000)),
        };
        (dispatcher, registry, origin)
    }

    fn frame(text: &str) -> Frame {
        Frame::from(text)
    }

    #[test]
    fn test_heartbeat_registers_and_acks() {
        // Arrange
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());

        // Act
        let reaction = dispatcher.handle_frame(&origin, &frame("[CS*123456*0002*LK]"));

        // Assert
        assert_eq!(reaction.ack.as_deref(), Some("[CS*123456*0002*LK]"));
        assert_eq!(reaction.device_id, Some(DeviceId::from("123456")));
        assert_eq!(
            registry.lookup_connection(&DeviceId::from("123456")),
            Some(origin.connection_id)
        );
    }

    #[test]
    fn test_heartbeat_records_battery() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());

        dispatcher.handle_frame(&origin, &frame("[CS*1*0009*LK,0,0,77]"));

        assert_eq!(
            registry.lookup_session(&DeviceId::from("1")).unwrap().battery,
            Some(77)
        );
    }

    #[test]
    fn test_position_updates_location_without_ack() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());
        let text = trackgate_core::encode_frame(
            "CS",
            "1",
            "UD,220414,134652,A,22.5,S,113.8,W,0,0,0,7,60,42",
        );

        let reaction = dispatcher.handle_frame(&origin, &Frame::from(text.as_str()));

        assert!(reaction.ack.is_none());
        let session = registry.lookup_session(&DeviceId::from("1")).unwrap();
        let location = session.location.unwrap();
        assert!((location.latitude + 22.5).abs() < 1e-9);
        assert!((location.longitude + 113.8).abs() < 1e-9);
        assert_eq!(session.battery, Some(42));
    }

    #[test]
    fn test_position_keeps_previous_telemetry_when_fields_missing() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());
        dispatcher.handle_frame(&origin, &frame("[CS*1*0009*LK,0,0,77]"));

        dispatcher.handle_frame(&origin, &frame("[CS*1*0002*UD]"));

        let session = registry.lookup_session(&DeviceId::from("1")).unwrap();
        assert_eq!(session.battery, Some(77));
        assert!(session.location.is_none());
    }

    #[test]
    fn test_alarm_with_length_mismatch_is_acked_and_recorded() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());

        let reaction = dispatcher.handle_frame(&origin, &frame("[CS*123456*0005*AL,1,2]"));

        assert_eq!(reaction.ack.as_deref(), Some("[CS*123456*0002*AL]"));
        let alarm = registry
            .lookup_session(&DeviceId::from("123456"))
            .unwrap()
            .last_alarm
            .unwrap();
        assert_eq!(alarm.kind, AlarmKind::Generic);
    }

    #[test]
    fn test_alarm_uses_configured_codebook() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new().with_bit(0, "sos"));
        let text = trackgate_core::encode_frame(
            "CS",
            "9",
            "AL,220414,134652,A,1,N,2,E,0,0,0,5,60,90,0,0,00000001",
        );

        dispatcher.handle_frame(&origin, &Frame::from(text.as_str()));

        let alarm = registry
            .lookup_session(&DeviceId::from("9"))
            .unwrap()
            .last_alarm
            .unwrap();
        assert_eq!(alarm.kind, AlarmKind::Named("sos".to_string()));
    }

    #[test]
    fn test_unknown_command_has_no_effect() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());

        let reaction = dispatcher.handle_frame(&origin, &frame("[CS*1*0004*TKQ2]"));

        assert_eq!(reaction, Reaction::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_parse_error_has_no_effect() {
        let (dispatcher, registry, origin) = setup(AlarmCodebook::new());

        let reaction = dispatcher.handle_frame(&origin, &frame("[CS*1*zz*LK]"));

        assert_eq!(reaction, Reaction::default());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ack_mirrors_manufacturer_code() {
        let (dispatcher, _registry, origin) = setup(AlarmCodebook::new());

        let reaction = dispatcher.handle_frame(&origin, &frame("[3G*4700000001*0002*LK]"));

        assert_eq!(reaction.ack.as_deref(), Some("[3G*4700000001*0002*LK]"));
    }
}
