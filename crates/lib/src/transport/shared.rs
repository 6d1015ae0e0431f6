//! Shared utilities for transport implementations.

use tokio::sync::oneshot;

use super::TransportError;

/// Manages server lifecycle state common to transport implementations.
#[derive(Debug, Default)]
pub struct ServerState {
    /// Whether the server is running.
    running: bool,
    /// Shutdown signal for the server loop.
    shutdown: Option<oneshot::Sender<()>>,
    /// The server's bound address.
    address: Option<String>,
}

impl ServerState {
    /// Create a new server state manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the server is currently running.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Get the server address if available.
    pub fn address(&self) -> Result<String, TransportError> {
        self.address
            .clone()
            .ok_or(TransportError::ServerNotRunning)
    }

    /// Mark the server as running with its bound address and shutdown
    /// sender.
    pub fn server_started(&mut self, address: String, shutdown: oneshot::Sender<()>) {
        self.running = true;
        self.address = Some(address);
        self.shutdown = Some(shutdown);
    }

    /// Trigger shutdown and clear state.
    pub fn stop_server(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.running = false;
        self.address = None;
    }
}
