//! RPC server listener
//!
//! Accepts incoming connections and serves each on its own task.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_native_tls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use super::handler::handle_connection;
use super::tls::TlsError;
use crate::service::MethodTable;

/// Server startup errors
#[derive(Debug, Error)]
pub enum ServerError {
    /// Could not bind the listening socket
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS material could not be loaded
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Other socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// RPC server serving one method table
pub struct RpcServer {
    /// Registered handlers
    table: Arc<MethodTable>,
    /// Shared secret every call must present
    auth_key: Arc<str>,
    /// TLS acceptor, plaintext when absent
    tls: Option<TlsAcceptor>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl RpcServer {
    /// Create a plaintext server
    pub fn new(table: MethodTable, auth_key: impl Into<String>, cancel: CancellationToken) -> Self {
        let auth_key: String = auth_key.into();
        Self {
            table: Arc::new(table),
            auth_key: Arc::from(auth_key),
            tls: None,
            cancel,
        }
    }

    /// Serve TLS instead of plaintext
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    /// Bind `bind_addr` and serve until cancelled
    pub async fn run(&self, bind_addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: bind_addr.to_string(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!("RPC server listening on tcp@{}", local_addr);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("RPC server shutting down");
                    break;
                }

                result = listener.accept() => {
                    match result {
                        Ok((socket, peer_addr)) => self.spawn_connection(socket, peer_addr),
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn spawn_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        tracing::debug!("New connection from {}", peer_addr);

        let table = Arc::clone(&self.table);
        let auth_key = Arc::clone(&self.auth_key);
        let tls = self.tls.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let result = match tls {
                Some(acceptor) => match acceptor.accept(socket).await {
                    Ok(stream) => {
                        handle_connection(stream, peer_addr, &table, &auth_key, cancel).await
                    }
                    Err(e) => {
                        tracing::warn!("TLS handshake with {} failed: {}", peer_addr, e);
                        return;
                    }
                },
                None => handle_connection(socket, peer_addr, &table, &auth_key, cancel).await,
            };

            match result {
                Ok(()) => tracing::debug!("Connection from {} closed", peer_addr),
                Err(e) => tracing::warn!("Connection from {} closed with error: {}", peer_addr, e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_failure_is_returned() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap().to_string();

        let server = RpcServer::new(MethodTable::new(), "secret", CancellationToken::new());
        let err = server.run(&addr).await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let server = RpcServer::new(MethodTable::new(), "secret", cancel.clone());
        cancel.cancel();
        server.serve(listener).await.unwrap();
    }
}
