//! Forwarding side of the activation channel.
//!
//! A redirected launch connects to the owner's listener, sends its
//! activation payload as one framed message, and waits only for the
//! receipt acknowledgment before terminating.

use super::protocol::{read_frame, write_frame, ActivationAck, ActivationMessage};
use crate::config::CoordinatorConfig;
use crate::error::{CadenceError, Result};
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tracing::debug;

/// Forward an activation payload to the owning instance.
///
/// Returns once the owner acknowledges receipt; the owner handles the
/// activation asynchronously after that.
pub async fn forward_activation(
    addr: SocketAddr,
    owner_pid: u32,
    message: &ActivationMessage,
) -> Result<()> {
    let unreachable = || CadenceError::OwnerUnreachable {
        pid: owner_pid,
        port: addr.port(),
    };

    let mut stream = tokio::time::timeout(
        CoordinatorConfig::ACTIVATION_CONNECT_TIMEOUT,
        TcpStream::connect(addr),
    )
    .await
    .map_err(|_| unreachable())?
    .map_err(|_| unreachable())?;

    debug!("Forwarding activation to owner at {} (PID {})", addr, owner_pid);

    let bytes = serde_json::to_vec(message)?;
    let (mut reader, mut writer) = stream.split();

    write_frame(&mut writer, &bytes)
        .await
        .map_err(|_| unreachable())?;

    let ack_bytes = tokio::time::timeout(
        CoordinatorConfig::ACTIVATION_ACK_TIMEOUT,
        read_frame(&mut reader),
    )
    .await
    .map_err(|_| unreachable())?
    .map_err(|_| unreachable())?
    .ok_or_else(unreachable)?;

    let ack: ActivationAck = serde_json::from_slice(&ack_bytes).map_err(|e| CadenceError::Json {
        message: format!("Malformed activation ack: {}", e),
        source: Some(e),
    })?;

    if !ack.received {
        return Err(unreachable());
    }

    Ok(())
}
