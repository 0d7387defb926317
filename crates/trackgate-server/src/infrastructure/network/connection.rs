//! The per-connection task.
//!
//! One task owns one device connection for its whole life:
//!
//! ```text
//!            ┌──────────── socket read ───────────┐
//!            ▼                                    │
//!   FrameDecoder ──frames──► Dispatcher ──ack──► socket write
//!                                                 ▲
//!   operator queue (mpsc) ────────────────────────┘
//! ```
//!
//! The task `select!`s between the socket and its operator-command queue, so
//! a device that stays silent can still receive commands.  Frames from one
//! connection are dispatched strictly in arrival order.
//!
//! # Cleanup (for beginners)
//!
//! A connection can end in several ways: the device closes the socket, a read
//! or write fails, or the whole task is dropped during shutdown.  Instead of
//! repeating the cleanup code at every exit, the task creates a
//! [`ConnectionGuard`] up front.  Rust runs a value's `Drop` implementation
//! exactly once when it goes out of scope, whichever path is taken, so the
//! connection is always removed from the table and the registry once.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use trackgate_core::{ConnectionId, DeviceId, FrameDecoder};

use crate::application::dispatch::Origin;
use crate::infrastructure::network::{GatewayState, NetworkError};

/// Size of the socket read buffer.
pub const READ_BUFFER_SIZE: usize = 4096;

/// Serves one device connection until it closes or fails.
///
/// Generic over the stream type so tests can drive it with an in-memory mock
/// instead of a socket.  `peer` is recorded in the registry when the device
/// identifies itself.
///
/// # Errors
///
/// Returns [`NetworkError`] when a read or write fails.  A clean EOF returns
/// `Ok(())`.  Cleanup happens in both cases.
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    state: Arc<GatewayState>,
) -> Result<(), NetworkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let connection_id = ConnectionId::new();
    let (tx, mut commands) = mpsc::channel::<String>(state.outbound_queue);
    state.connections.insert(connection_id, tx);
    let mut guard = ConnectionGuard {
        connection_id,
        device_id: None,
        state: Arc::clone(&state),
    };

    info!("connection {connection_id} opened from {peer}");

    let origin = Origin {
        connection_id,
        peer,
    };
    let mut decoder = FrameDecoder::with_max_pending(state.max_pending_bytes);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = stream.read(&mut buf) => {
                let n = read.map_err(NetworkError::Read)?;
                if n == 0 {
                    debug!("connection {connection_id}: peer closed the stream");
                    return Ok(());
                }
                trace!("connection {connection_id} raw: {}", hex(&buf[..n]));

                for frame in decoder.feed(&buf[..n]) {
                    let reaction = state.dispatcher.handle_frame(&origin, &frame);
                    if let Some(device_id) = reaction.device_id {
                        guard.device_id = Some(device_id);
                    }
                    if let Some(ack) = reaction.ack {
                        stream
                            .write_all(ack.as_bytes())
                            .await
                            .map_err(NetworkError::Write)?;
                    }
                }
            }
            Some(command) = commands.recv() => {
                debug!("connection {connection_id} → operator command {command}");
                stream
                    .write_all(command.as_bytes())
                    .await
                    .map_err(NetworkError::Write)?;
            }
        }
    }
}

/// Removes a connection from the gateway when dropped.
struct ConnectionGuard {
    connection_id: ConnectionId,
    /// Last device id this connection identified as.
    device_id: Option<DeviceId>,
    state: Arc<GatewayState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connections.remove(self.connection_id);
        self.state.registry.unregister_by_connection(self.connection_id);
        match &self.device_id {
            Some(device_id) => info!(
                "connection {} (device {device_id}) closed",
                self.connection_id
            ),
            None => info!("connection {} closed", self.connection_id),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
