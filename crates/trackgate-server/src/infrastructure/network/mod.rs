//! Network infrastructure: the device-facing TCP side of the gateway.
//!
//! # Sub-modules
//!
//! - **`listener`** – Binds the device port and spawns one task per accepted
//!   connection until the shutdown flag is cleared.
//!
//! - **`connection`** – The per-connection task: reads bytes, extracts frames,
//!   dispatches them, writes acknowledgements and queued operator commands,
//!   and cleans up exactly once when the connection ends.
//!
//! - **`connections`** – Table of live connections' outbound queues; the
//!   [`CommandLink`](crate::application::control::CommandLink) used to reach a
//!   device.

pub mod connection;
pub mod connections;
pub mod listener;

use std::sync::Arc;

use thiserror::Error;

use trackgate_core::AlarmCodebook;

use crate::application::dispatch::Dispatcher;
use crate::application::registry::DeviceRegistry;
use crate::infrastructure::storage::config::GatewayConfig;

pub use connection::serve_connection;
pub use connections::ConnectionTable;
pub use listener::{run_server, serve};

/// Error that ends one connection.  Never fatal to the gateway.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),
}

/// Everything a connection task needs, shared by all of them.
pub struct GatewayState {
    pub registry: Arc<DeviceRegistry>,
    pub connections: Arc<ConnectionTable>,
    pub dispatcher: Dispatcher,
    /// Upper bound on unterminated bytes kept per connection.
    pub max_pending_bytes: usize,
    /// Capacity of each connection's operator-command queue.
    pub outbound_queue: usize,
}

impl GatewayState {
    pub fn new(gateway: &GatewayConfig, codebook: AlarmCodebook) -> Arc<Self> {
        let registry = Arc::new(DeviceRegistry::new());
        Arc::new(Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry), codebook),
            registry,
            connections: Arc::new(ConnectionTable::new()),
            max_pending_bytes: gateway.max_pending_bytes.max(1),
            outbound_queue: gateway.outbound_queue.max(1),
        })
    }
}
