//! Outbound queues of live connections, keyed by connection id.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TrySendError};

use trackgate_core::ConnectionId;

use crate::application::control::{CommandLink, ControlError};

/// Maps each open connection to the sender half of its command queue.
///
/// A connection task inserts itself on start and removes itself on exit, so
/// an entry exists exactly while the task can still write to its socket.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    senders: Mutex<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<ConnectionId, mpsc::Sender<String>>> {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, connection_id: ConnectionId, sender: mpsc::Sender<String>) {
        self.senders().insert(connection_id, sender);
    }

    /// Returns `true` if the connection was present.
    pub fn remove(&self, connection_id: ConnectionId) -> bool {
        self.senders().remove(&connection_id).is_some()
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.senders().contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.senders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommandLink for ConnectionTable {
    fn deliver(&self, connection_id: ConnectionId, command: String) -> Result<(), ControlError> {
        // Clone the sender so the table lock is not held while sending.
        let sender = self
            .senders()
            .get(&connection_id)
            .cloned()
            .ok_or(ControlError::ConnectionClosed(connection_id))?;
        sender.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => ControlError::QueueFull(connection_id),
            TrySendError::Closed(_) => ControlError::ConnectionClosed(connection_id),
        })
    }
}
