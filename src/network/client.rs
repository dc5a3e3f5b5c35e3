//! Length-framed TCP client with reconnect-on-failure.
//!
//! Grounded on a client that keeps a single connection per peer open and
//! transparently reconnects when the peer closes it: errors that look like
//! the other side hanging up (EOF, broken pipe, connection reset) trigger
//! a bounded number of reconnect attempts before the send is retried once.

use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use super::{read_frame, write_frame};
use crate::error::{Error, Result};

pub struct TcpClient {
    address: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    reconnect_max_tries: usize,
    connection: Mutex<Option<TcpStream>>,
}

impl TcpClient {
    pub fn new(
        address: String,
        connect_timeout: Duration,
        request_timeout: Duration,
        reconnect_max_tries: usize,
    ) -> Self {
        Self {
            address,
            connect_timeout,
            request_timeout,
            reconnect_max_tries,
            connection: Mutex::new(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sends `payload` and waits for the response, reconnecting transparently
    /// if the cached connection turned out to be dead.
    pub async fn send(&self, payload: &[u8]) -> Result<Vec<u8>> {
        timeout(self.request_timeout, self.send_inner(payload))
            .await
            .unwrap_or(Err(Error::ConnectionTimeout(self.address.clone())))
    }

    async fn send_inner(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        match self.try_send(guard.as_mut().unwrap(), payload).await {
            Ok(response) => Ok(response),
            Err(e) if is_reconnectable(&e) => {
                *guard = Some(self.reconnect().await?);
                self.try_send(guard.as_mut().unwrap(), payload).await
            }
            Err(e) => Err(e),
        }
    }

    async fn try_send(&self, stream: &mut TcpStream, payload: &[u8]) -> Result<Vec<u8>> {
        write_frame(stream, payload).await?;
        read_frame(stream).await
    }

    async fn connect(&self) -> Result<TcpStream> {
        match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: self.address.clone(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(self.address.clone())),
        }
    }

    async fn reconnect(&self) -> Result<TcpStream> {
        let mut last_err = Error::PeerUnreachable(self.address.clone());
        for attempt in 0..self.reconnect_max_tries {
            match self.connect().await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    tracing::debug!(address = %self.address, attempt, error = %e, "reconnect attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    pub async fn close(&self) {
        *self.connection.lock().await = None;
    }
}

fn is_reconnectable(err: &Error) -> bool {
    match err {
        Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::NotConnected
        ),
        Error::Network(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("eof") || msg.contains("broken pipe") || msg.contains("closed")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fails_fast_against_unreachable_peer() {
        let client = TcpClient::new(
            "127.0.0.1:1".to_string(),
            Duration::from_millis(100),
            Duration::from_millis(500),
            2,
        );
        let result = client.send(b"ping").await;
        assert!(result.is_err());
    }
}
