//! DeviceRegistry: the authoritative in-memory directory of connected devices.
//!
//! Each entry ([`DeviceSession`]) binds a device id to the connection that
//! most recently spoke for it, plus the last telemetry seen from it.
//!
//! # Two maps, one lock (for beginners)
//!
//! The registry keeps two `HashMap`s:
//!
//! ```text
//! sessions:       DeviceId     ──► DeviceSession { connection_id, .. }
//! by_connection:  ConnectionId ──► DeviceId
//! ```
//!
//! The second map exists only so a closing connection can find "its" device
//! without scanning every session.  Both maps sit behind a single `Mutex`, so
//! no caller can ever observe one updated without the other.
//!
//! # Last registration wins
//!
//! Trackers reconnect aggressively: a device may open a new TCP connection
//! before the server has noticed the old one died.  When connection `B`
//! registers device `D` that connection `A` registered earlier, the session
//! moves to `B`.  When `A` finally closes, [`DeviceRegistry::unregister_by_connection`]
//! sees that `D` now belongs to `B` and leaves it alone.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::info;

use trackgate_core::protocol::messages::Coordinates;
use trackgate_core::{AlarmKind, ConnectionId, DeviceId};

/// Error type for registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The device id has no session.  The registry was left unchanged.
    #[error("device {0} is not registered")]
    UnknownDevice(DeviceId),
}

// ── Session types ─────────────────────────────────────────────────────────────

/// Most recent alarm reported by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub kind: AlarmKind,
    /// Server time at which the alarm was received.
    pub received_at: DateTime<Utc>,
}

/// Live record for one device id.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceSession {
    pub device_id: DeviceId,
    /// Connection currently bound to this device.
    pub connection_id: ConnectionId,
    /// Peer address captured at the last registration.
    pub ip: IpAddr,
    pub port: u16,
    pub last_seen: DateTime<Utc>,
    /// Signed decimal degrees.
    pub location: Option<Coordinates>,
    /// Battery percentage.
    pub battery: Option<u8>,
    pub last_alarm: Option<AlarmRecord>,
}

/// Mutable telemetry fields merged by [`DeviceRegistry::update_fields`].
///
/// Identity fields (device id, connection, peer address) cannot be expressed
/// here and therefore can never be changed through an update.  `None` leaves
/// the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionUpdate {
    pub last_seen: Option<DateTime<Utc>>,
    pub location: Option<Coordinates>,
    pub battery: Option<u8>,
    pub last_alarm: Option<AlarmRecord>,
}

impl SessionUpdate {
    /// An update that only refreshes `last_seen`.
    pub fn seen_at(at: DateTime<Utc>) -> Self {
        Self {
            last_seen: Some(at),
            ..Self::default()
        }
    }

    fn apply_to(self, session: &mut DeviceSession) {
        if let Some(at) = self.last_seen {
            session.last_seen = at;
        }
        if let Some(location) = self.location {
            session.location = Some(location);
        }
        if let Some(battery) = self.battery {
            session.battery = Some(battery);
        }
        if let Some(alarm) = self.last_alarm {
            session.last_alarm = Some(alarm);
        }
    }
}

/// What [`DeviceRegistry::register`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No session existed for the device id.
    Created,
    /// The same connection registered again; telemetry was kept.
    Refreshed,
    /// The session was taken over from another connection.
    Replaced { previous: ConnectionId },
}

// ── Registry ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Directory {
    sessions: HashMap<DeviceId, DeviceSession>,
    by_connection: HashMap<ConnectionId, DeviceId>,
}

/// Thread-safe device directory.
///
/// Construct one per gateway and share it behind an `Arc`; every method takes
/// `&self`.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    inner: Mutex<Directory>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn directory(&self) -> MutexGuard<'_, Directory> {
        // No operation panics between its two map updates, so a poisoned
        // lock still guards consistent maps.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds `device_id` to `connection_id`, creating or overwriting its
    /// session and stamping `last_seen` with the current time.
    ///
    /// Re-registering from the same connection keeps the stored telemetry.
    /// Registering from a different connection starts a fresh session and
    /// detaches the previous connection from the directory without closing it.
    pub fn register(
        &self,
        device_id: &DeviceId,
        connection_id: ConnectionId,
        peer: SocketAddr,
    ) -> Registration {
        bind(&mut self.directory(), device_id, connection_id, peer)
    }

    /// Registers `device_id` and merges `update` into its session under one
    /// lock, so the update always lands on the session this call bound.
    pub fn register_and_update(
        &self,
        device_id: &DeviceId,
        connection_id: ConnectionId,
        peer: SocketAddr,
        update: SessionUpdate,
    ) -> Registration {
        let mut dir = self.directory();
        let outcome = bind(&mut dir, device_id, connection_id, peer);
        if let Some(session) = dir.sessions.get_mut(device_id) {
            update.apply_to(session);
        }
        outcome
    }

    /// Tears down whatever `connection_id` registered.
    ///
    /// The session is removed only if it is still bound to `connection_id`;
    /// the reverse-index entry is removed in every case.  Returns the device
    /// id whose session was removed.
    pub fn unregister_by_connection(&self, connection_id: ConnectionId) -> Option<DeviceId> {
        let mut dir = self.directory();
        let device_id = dir.by_connection.remove(&connection_id)?;
        let owned = dir
            .sessions
            .get(&device_id)
            .is_some_and(|s| s.connection_id == connection_id);
        if !owned {
            return None;
        }
        dir.sessions.remove(&device_id);
        info!("device {device_id} unregistered (connection {connection_id} closed)");
        Some(device_id)
    }

    /// Removes the session for `device_id` regardless of which connection
    /// holds it.
    pub fn unregister_by_device_id(&self, device_id: &DeviceId) -> Option<DeviceSession> {
        let mut dir = self.directory();
        let session = dir.sessions.remove(device_id)?;
        if dir.by_connection.get(&session.connection_id) == Some(device_id) {
            dir.by_connection.remove(&session.connection_id);
        }
        info!("device {device_id} unregistered");
        Some(session)
    }

    /// Merges `update` into the existing session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownDevice`] when `device_id` has no
    /// session; no session is created.
    pub fn update_fields(
        &self,
        device_id: &DeviceId,
        update: SessionUpdate,
    ) -> Result<(), RegistryError> {
        let mut dir = self.directory();
        let session = dir
            .sessions
            .get_mut(device_id)
            .ok_or_else(|| RegistryError::UnknownDevice(device_id.clone()))?;
        update.apply_to(session);
        Ok(())
    }

    pub fn lookup_connection(&self, device_id: &DeviceId) -> Option<ConnectionId> {
        self.directory()
            .sessions
            .get(device_id)
            .map(|s| s.connection_id)
    }

    pub fn lookup_session(&self, device_id: &DeviceId) -> Option<DeviceSession> {
        self.directory().sessions.get(device_id).cloned()
    }

    /// The device id currently registered by `connection_id`, if any.
    pub fn device_for_connection(&self, connection_id: ConnectionId) -> Option<DeviceId> {
        self.directory().by_connection.get(&connection_id).cloned()
    }

    /// Snapshot of every session, sorted by device id.
    pub fn list_all(&self) -> Vec<DeviceSession> {
        let mut sessions: Vec<DeviceSession> =
            self.directory().sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        sessions
    }

    pub fn len(&self) -> usize {
        self.directory().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Binds `device_id` to `connection_id` inside an already-locked directory.
fn bind(
    dir: &mut Directory,
    device_id: &DeviceId,
    connection_id: ConnectionId,
    peer: SocketAddr,
) -> Registration {
    let now = Utc::now();

    // A connection speaks for one device; drop whatever it spoke for before.
    if let Some(old_device) = dir.by_connection.get(&connection_id).cloned() {
        if &old_device != device_id {
            let still_bound = dir
                .sessions
                .get(&old_device)
                .is_some_and(|s| s.connection_id == connection_id);
            if still_bound {
                dir.sessions.remove(&old_device);
                info!("connection {connection_id} switched from device {old_device} to {device_id}");
            }
        }
    }

    let current = dir.sessions.get(device_id).map(|s| s.connection_id);
    let outcome = match current {
        Some(bound) if bound == connection_id => Registration::Refreshed,
        Some(previous) => Registration::Replaced { previous },
        None => Registration::Created,
    };

    if outcome == Registration::Refreshed {
        if let Some(session) = dir.sessions.get_mut(device_id) {
            session.ip = peer.ip();
            session.port = peer.port();
            session.last_seen = now;
        }
    } else {
        dir.sessions.insert(
            device_id.clone(),
            DeviceSession {
                device_id: device_id.clone(),
                connection_id,
                ip: peer.ip(),
                port: peer.port(),
                last_seen: now,
                location: None,
                battery: None,
                last_alarm: None,
            },
        );
    }

    if let Registration::Replaced { previous } = outcome {
        dir.by_connection.remove(&previous);
        info!("device {device_id} moved from connection {previous} to {connection_id}");
    } else if outcome == Registration::Created {
        info!("device {device_id} registered from {peer}");
    }
    dir.by_connection.insert(connection_id, device_id.clone());
    outcome
}

// ── Tests ─────────────────────────────────────────────────────────────────────
