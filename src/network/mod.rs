//! Network Module
//!
//! Plain length-prefixed framing shared by the client-facing query server
//! and the replica-to-replica protocol: a 2-byte big-endian length prefix
//! followed by that many bytes of payload. No checksum; higher layers
//! decide how to interpret the payload bytes.

mod client;
mod server;

pub use client::TcpClient;
pub use server::{RequestHandler, TcpServer};

use crate::error::{Error, Result};

const HEADER_SIZE: usize = 2;

/// Caps a single frame at 16 MiB, well above any query or segment-sync
/// payload this system produces, as a guard against a malformed peer.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub async fn read_frame<R: tokio::io::AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>> {
    use tokio::io::AsyncReadExt;

    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;
    let len = u16::from_be_bytes(header) as usize;

    if len > MAX_FRAME_SIZE {
        return Err(Error::Network(format!(
            "frame too large: {len} bytes (max {MAX_FRAME_SIZE})"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(body)
}

pub async fn write_frame<W: tokio::io::AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    if payload.len() > u16::MAX as usize {
        return Err(Error::Network(format!(
            "frame too large to encode: {} bytes (max {})",
            payload.len(),
            u16::MAX
        )));
    }

    writer.write_all(&(payload.len() as u16).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}
