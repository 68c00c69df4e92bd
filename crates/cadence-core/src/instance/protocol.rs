//! Activation wire protocol and framing.
//!
//! Defines the wire format for the local activation channel: 4-byte
//! big-endian length prefix followed by a UTF-8 JSON payload.
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```

use crate::config::CoordinatorConfig;
use crate::error::{CadenceError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Activation request forwarded from a redirected launch to the owner.
///
/// The payload is opaque to this core; it is carried verbatim from the
/// hosting environment to the owner's activation callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationMessage {
    /// Launch id of the redirecting process.
    pub launch_id: String,
    /// Host-supplied activation arguments, forwarded verbatim.
    pub payload: serde_json::Value,
}

/// Owner's acknowledgment of a forwarded activation.
///
/// Receipt only; the redirecting process does not wait for handling
/// beyond this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationAck {
    pub received: bool,
}

/// Read a length-prefixed frame from an async reader.
///
/// Frame format: `[4-byte BE u32 length][payload bytes]`
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    if len > CoordinatorConfig::MAX_ACTIVATION_MESSAGE_SIZE {
        return Err(CadenceError::Validation {
            field: "activation_frame".to_string(),
            message: format!(
                "Activation message size {} exceeds maximum {}",
                len,
                CoordinatorConfig::MAX_ACTIVATION_MESSAGE_SIZE
            ),
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Write a length-prefixed frame to an async writer.
///
/// Frame format: `[4-byte BE u32 length][payload bytes]`
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activation_message_serialization_roundtrip() {
        let msg = ActivationMessage {
            launch_id: "launch-1".to_string(),
            payload: serde_json::json!({"kind": "file", "uri": "cadence://album/42"}),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: ActivationMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.launch_id, "launch-1");
        assert_eq!(parsed.payload["uri"], "cadence://album/42");
    }

    #[tokio::test]
    async fn test_frame_read_write_roundtrip() {
        let payload = b"hello world";
        let mut buf = Vec::new();

        write_frame(&mut buf, payload).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read_back = read_frame(&mut cursor).await.unwrap();

        assert_eq!(read_back, Some(payload.to_vec()));
    }

    #[tokio::test]
    async fn test_frame_read_empty_stream_returns_none() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let result = read_frame(&mut cursor).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_frame_read_oversized_returns_error() {
        // Craft a frame header claiming a huge payload
        let huge_len: u32 = (CoordinatorConfig::MAX_ACTIVATION_MESSAGE_SIZE + 1) as u32;
        let mut buf = Vec::new();
        buf.extend_from_slice(&huge_len.to_be_bytes());
        buf.extend_from_slice(&[0u8; 8]); // some bytes but not enough

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_frame(&mut cursor).await;
        assert!(matches!(result, Err(CadenceError::Validation { .. })));
    }
}
