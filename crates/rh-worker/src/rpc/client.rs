//! Connection-reusing RPC client
//!
//! Calls are serialized over one connection. Every call carries the shared
//! token, so the controller holds no session state for the worker. When a
//! call fails at the transport level the connection is dropped and the next
//! call dials again; the failing call itself is not retried.

use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_native_tls::TlsConnector;
use tokio_util::codec::Framed;

use rh_core::api::{RpcMethod, RpcRequest};
use rh_core::config::WorkerConfig;
use rh_core::RpcError;
use rh_protocol::{CallId, Frame, FrameCodec, Message};

use super::tls;

/// Byte stream the client can frame, plain or TLS
trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

type Connection = Framed<Box<dyn Transport>, FrameCodec>;

struct ClientTls {
    connector: TlsConnector,
    server_name: String,
}

struct ConnectionSlot {
    framed: Option<Connection>,
    next_id: CallId,
}

/// Client for the controller's RPC API
pub struct RpcClient {
    address: String,
    token: String,
    call_timeout: Duration,
    tls: Option<ClientTls>,
    slot: Mutex<ConnectionSlot>,
}

impl RpcClient {
    /// Plaintext client
    pub fn new(address: impl Into<String>, token: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            call_timeout,
            tls: None,
            slot: Mutex::new(ConnectionSlot {
                framed: None,
                next_id: CallId::new(1),
            }),
        }
    }

    /// Build a client from the worker configuration
    pub fn from_config(config: &WorkerConfig) -> Result<Self, RpcError> {
        let client = Self::new(
            config.controller_address.clone(),
            config.auth_key.clone(),
            config.call_timeout,
        );
        if !config.tls.enabled {
            return Ok(client);
        }
        let connector = tls::load_connector(&config.tls)?;
        let server_name = tls::server_name(&config.tls, &config.controller_address);
        Ok(client.with_tls(connector, server_name))
    }

    /// Wrap every connection in TLS
    pub fn with_tls(mut self, connector: TlsConnector, server_name: impl Into<String>) -> Self {
        self.tls = Some(ClientTls {
            connector,
            server_name: server_name.into(),
        });
        self
    }

    /// Controller address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Call a typed method
    pub async fn call<R: RpcRequest>(&self, request: &R) -> Result<R::Response, RpcError> {
        let body = serde_json::to_vec(request)?;
        let reply = self.invoke(R::METHOD, Bytes::from(body)).await?;
        Ok(serde_json::from_slice(&reply)?)
    }

    /// Send one call and wait for its reply body
    pub async fn invoke(&self, method: RpcMethod, body: Bytes) -> Result<Bytes, RpcError> {
        let mut slot = self.slot.lock().await;
        let call_id = slot.next_id;
        slot.next_id = call_id.next();

        let result = tokio::time::timeout(
            self.call_timeout,
            self.exchange(&mut slot.framed, call_id, method, body),
        )
        .await
        .unwrap_or_else(|_| Err(RpcError::Timeout(self.call_timeout)));

        if let Err(e) = &result {
            if e.is_connection_error() {
                tracing::debug!(%method, "Dropping controller connection: {}", e);
                slot.framed = None;
            }
        }
        result
    }

    async fn exchange(
        &self,
        framed: &mut Option<Connection>,
        call_id: CallId,
        method: RpcMethod,
        body: Bytes,
    ) -> Result<Bytes, RpcError> {
        if framed.is_none() {
            *framed = Some(self.connect().await?);
        }
        let conn = framed.as_mut().ok_or(RpcError::ConnectionClosed)?;

        let call = Message::Call {
            method: method.as_str().to_string(),
            token: self.token.clone(),
            body,
        };
        conn.send(Frame::new(call_id, call)).await?;

        loop {
            let frame = match conn.next().await {
                Some(frame) => frame?,
                None => return Err(RpcError::ConnectionClosed),
            };
            if frame.call_id != call_id {
                tracing::debug!("Discarding reply for stale {}", frame.call_id);
                continue;
            }
            return match frame.message {
                Message::Reply { body } => Ok(body),
                Message::Fault { code, message } => Err(RpcError::from_fault(code, message)),
                Message::Call { .. } => Err(RpcError::Remote {
                    code: rh_protocol::ErrorCode::InvalidMessage,
                    message: "controller sent a call".to_string(),
                }),
            };
        }
    }

    async fn connect(&self) -> Result<Connection, RpcError> {
        tracing::debug!("Connecting to controller at {}", self.address);
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;

        let transport: Box<dyn Transport> = match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(&tls.server_name, stream)
                    .await
                    .map_err(|e| RpcError::Tls(e.to_string()))?;
                Box::new(stream)
            }
            None => Box::new(stream),
        };

        Ok(Framed::new(transport, FrameCodec::new()))
    }
}
