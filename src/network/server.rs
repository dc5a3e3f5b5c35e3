//! Generic length-framed TCP server.
//!
//! Accepts connections up to a configured concurrency cap and hands each
//! request/response pair to a [`RequestHandler`]. Used both for the
//! client-facing query server and the replica-to-replica listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Notify, Semaphore};

use super::{read_frame, write_frame};
use crate::error::{Error, Result};

/// Per-connection idle deadline: a connection that neither sends nor
/// receives for this long is dropped.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: Vec<u8>) -> Vec<u8>;
}

/// Tracks in-flight connection handlers so shutdown can wait for them to
/// drain instead of cutting them off, mirroring a `sync.WaitGroup`.
struct WaitGroup {
    count: AtomicUsize,
    notify: Notify,
}

impl WaitGroup {
    fn new() -> Self {
        Self { count: AtomicUsize::new(0), notify: Notify::new() }
    }

    fn add(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn done(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct ActiveGuard(Arc<WaitGroup>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}

pub struct TcpServer<H: RequestHandler + 'static> {
    bind_address: String,
    handler: Arc<H>,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    connections: Arc<WaitGroup>,
}

impl<H: RequestHandler + 'static> TcpServer<H> {
    pub fn new(bind_address: String, max_connections: usize, handler: Arc<H>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            bind_address,
            handler,
            semaphore: Arc::new(Semaphore::new(max_connections.max(1))),
            shutdown,
            connections: Arc::new(WaitGroup::new()),
        }
    }

    pub async fn serve(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        tracing::info!(address = %self.bind_address, "server listening");

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let permit = self
                                .semaphore
                                .clone()
                                .acquire_owned()
                                .await
                                .expect("semaphore is never closed");
                            let handler = self.handler.clone();
                            self.connections.add();
                            let connections = self.connections.clone();
                            tokio::spawn(async move {
                                let _permit = permit;
                                let _guard = ActiveGuard(connections);
                                if let Err(e) = handle_connection(socket, handler).await {
                                    tracing::debug!(peer = %addr, error = %e, "connection closed");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(address = %self.bind_address, "server stopped accepting connections");
        Ok(())
    }

    /// Stops accepting new connections and waits for in-flight handlers to
    /// finish before returning.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.connections.wait().await;
        tracing::info!(address = %self.bind_address, "server stopped");
    }
}

async fn handle_connection<H: RequestHandler + ?Sized>(
    mut socket: TcpStream,
    handler: Arc<H>,
) -> Result<()> {
    loop {
        let request = match tokio::time::timeout(IDLE_TIMEOUT, read_frame(&mut socket)).await {
            Ok(Ok(request)) => request,
            Ok(Err(Error::Io(e))) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(()), // idle timeout: close quietly
        };

        let response = handler.handle(request).await;
        write_frame(&mut socket, &response).await?;
    }
}
