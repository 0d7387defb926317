//! Device listener: accept loop and per-connection task spawning.
//!
//! Each device connection runs in its own Tokio task, so one slow or silent
//! device never delays another.  The accept loop itself never blocks on a
//! connection: it accepts, spawns, and goes straight back to accepting.
//!
//! Shutdown is cooperative.  `main.rs` clears a shared `AtomicBool` on
//! Ctrl+C; the loop wakes from `accept()` at least every
//! [`ACCEPT_POLL_INTERVAL`] to check it.

use std::io;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::infrastructure::network::{serve_connection, GatewayState};

/// Longest time the accept loop waits before re-checking the shutdown flag.
pub const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Pause after a failed `accept()` before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Binds `addr` and serves devices until `running` is set to `false`.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound (e.g., the port is
/// already in use or the process lacks permission to bind).
pub async fn run_server(
    addr: SocketAddr,
    state: Arc<GatewayState>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind device listener on {addr}"))?;

    info!("device gateway listening on {addr}");
    serve(listener, state, running).await;
    Ok(())
}

/// Runs the accept loop on an already-bound listener.
///
/// Connections that are still open when the loop exits keep running until
/// the runtime shuts down.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>, running: Arc<AtomicBool>) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_device(stream, peer, state).await;
                });
            }
            Ok(Err(e)) => accept_failed(&e).await,
            Err(_) => {
                // No connection within the poll interval.
            }
        }
    }
}

/// Logs a failed accept and backs off.
///
/// Errors such as running out of file descriptors persist until some
/// connection closes, so retrying at once would spin.
async fn accept_failed(e: &io::Error) {
    error!("accept error: {e}; retrying in {ACCEPT_ERROR_BACKOFF:?}");
    sleep(ACCEPT_ERROR_BACKOFF).await;
}

async fn handle_device(stream: TcpStream, peer: SocketAddr, state: Arc<GatewayState>) {
    // Acknowledgements are tiny; send them immediately.
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY for {peer}: {e}");
    }
    if let Err(e) = serve_connection(stream, peer, state).await {
        warn!("connection from {peer} ended with error: {e}");
    }
}
