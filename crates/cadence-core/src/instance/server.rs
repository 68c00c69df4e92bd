//! Activation listener for the owning instance.
//!
//! Listens on `127.0.0.1:0` (OS-assigned port), accepts connections from
//! redirected launches, and hands each received activation to the
//! registered handler before acknowledging receipt.
//!
//! # Thread Safety
//!
//! The server runs on the tokio runtime. Each connection is handled in its
//! own spawned task; the handler is shared via `Arc`.

use super::protocol::{read_frame, write_frame, ActivationAck, ActivationMessage};
use crate::config::CoordinatorConfig;
use crate::error::{CadenceError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

/// Handler invoked for every activation the owner receives.
///
/// Implemented by the bootstrap layer to route activations to the
/// presentation collaborator's bring-to-front hook.
#[async_trait::async_trait]
pub trait ActivationHandler: Send + Sync + 'static {
    async fn on_activated(&self, message: ActivationMessage);
}

/// Handle to a running activation listener. Dropping shuts down the server.
pub struct ActivationServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    conn_shutdown_tx: watch::Sender<bool>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ActivationServerHandle {
    /// Get the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shut down the server gracefully.
    ///
    /// Stops accepting new connections and signals all active connection
    /// handlers to close.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = self.conn_shutdown_tx.send(true);
    }
}

impl Drop for ActivationServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

/// Activation server that listens for redirected launches.
pub struct ActivationServer;

impl ActivationServer {
    /// Start the activation server on a random local port.
    ///
    /// Returns a handle used to publish the port and shut down the server.
    /// The server runs in background tokio tasks.
    pub async fn start(handler: Arc<dyn ActivationHandler>) -> Result<ActivationServerHandle> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let port = addr.port();

        info!("Activation listener on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (conn_shutdown_tx, conn_shutdown_rx) = watch::channel(false);
        let active_connections = Arc::new(AtomicUsize::new(0));

        let task_handle = tokio::spawn(Self::accept_loop(
            listener,
            handler,
            shutdown_rx,
            conn_shutdown_rx,
            active_connections,
        ));

        Ok(ActivationServerHandle {
            addr,
            port,
            shutdown_tx: Some(shutdown_tx),
            conn_shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    async fn accept_loop(
        listener: TcpListener,
        handler: Arc<dyn ActivationHandler>,
        mut shutdown_rx: oneshot::Receiver<()>,
        conn_shutdown_rx: watch::Receiver<bool>,
        active_connections: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Activation listener shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let current = active_connections.load(Ordering::Relaxed);
                            if current >= CoordinatorConfig::MAX_ACTIVATION_CONNECTIONS {
                                warn!(
                                    "Rejecting activation connection from {}: at max capacity ({})",
                                    peer_addr,
                                    CoordinatorConfig::MAX_ACTIVATION_CONNECTIONS
                                );
                                continue;
                            }

                            active_connections.fetch_add(1, Ordering::Relaxed);
                            let handler = handler.clone();
                            let conns = active_connections.clone();
                            let mut conn_shutdown = conn_shutdown_rx.clone();

                            tokio::spawn(async move {
                                debug!("Activation connection from {}", peer_addr);
                                if let Err(e) = Self::handle_connection(stream, &*handler, &mut conn_shutdown).await {
                                    debug!("Activation connection {} ended: {}", peer_addr, e);
                                }
                                conns.fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            error!("Activation accept error: {}", e);
                        }
                    }
                }
            }
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        handler: &dyn ActivationHandler,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut reader, mut writer) = stream.split();

        loop {
            // Wait for either a frame or a shutdown signal
            let frame = tokio::select! {
                result = read_frame(&mut reader) => {
                    match result? {
                        Some(f) => f,
                        None => return Ok(()), // Clean disconnect
                    }
                }
                _ = shutdown_rx.changed() => {
                    return Ok(()); // Server shutting down
                }
            };

            let message: ActivationMessage =
                serde_json::from_slice(&frame).map_err(|e| CadenceError::Validation {
                    field: "activation_payload".to_string(),
                    message: format!("Malformed activation message: {}", e),
                })?;

            debug!("Activation received from launch {}", message.launch_id);
            handler.on_activated(message).await;

            let ack = serde_json::to_vec(&ActivationAck { received: true })?;
            write_frame(&mut writer, &ack).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        seen: Mutex<Vec<ActivationMessage>>,
    }

    #[async_trait::async_trait]
    impl ActivationHandler for RecordingHandler {
        async fn on_activated(&self, message: ActivationMessage) {
            self.seen.lock().unwrap().push(message);
        }
    }

    #[tokio::test]
    async fn test_server_start_and_shutdown() {
        let handler = Arc::new(RecordingHandler::default());
        let mut handle = ActivationServer::start(handler).await.unwrap();

        assert!(handle.port > 0);
        assert_eq!(handle.addr.ip(), std::net::Ipv4Addr::LOCALHOST);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_dispatches_activation_and_acks() {
        let handler = Arc::new(RecordingHandler::default());
        let mut handle = ActivationServer::start(handler.clone()).await.unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();

        let message = ActivationMessage {
            launch_id: "launch-2".to_string(),
            payload: serde_json::json!({"uri": "cadence://playlist/9"}),
        };
        let bytes = serde_json::to_vec(&message).unwrap();
        write_frame(&mut writer, &bytes).await.unwrap();

        let ack_bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let ack: ActivationAck = serde_json::from_slice(&ack_bytes).unwrap();
        assert!(ack.received);

        let seen = handler.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].launch_id, "launch-2");
        assert_eq!(seen[0].payload["uri"], "cadence://playlist/9");

        drop(seen);
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_server_rejects_malformed_message() {
        let handler = Arc::new(RecordingHandler::default());
        let mut handle = ActivationServer::start(handler.clone()).await.unwrap();

        let mut stream = TcpStream::connect(handle.addr()).await.unwrap();
        let (mut reader, mut writer) = stream.split();

        write_frame(&mut writer, b"not valid json").await.unwrap();

        // Connection is closed without an ack; no activation is dispatched
        let response = read_frame(&mut reader).await.unwrap();
        assert!(response.is_none());
        assert!(handler.seen.lock().unwrap().is_empty());

        handle.shutdown();
    }
}
