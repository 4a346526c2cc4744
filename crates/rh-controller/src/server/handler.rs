//! Per-connection call handling
//!
//! Every `Call` frame is authenticated on its own before the method table is
//! consulted; a rejected call never reaches its handler.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use rh_core::auth::validate_token;
use rh_protocol::{ErrorCode, Frame, FrameCodec, Message, ProtocolError};

use crate::service::MethodTable;

/// Serve calls on one connection until the peer disconnects
pub async fn handle_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    table: &MethodTable,
    auth_key: &str,
    cancel: CancellationToken,
) -> Result<(), ProtocolError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, FrameCodec::new());

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            next = framed.next() => match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(e),
                None => break,
            },
        };

        let reply = process_frame(frame, peer_addr, table, auth_key).await;
        framed.send(reply).await?;
    }

    Ok(())
}

/// Authenticate and dispatch one frame, producing the reply frame
pub async fn process_frame(
    frame: Frame,
    peer_addr: SocketAddr,
    table: &MethodTable,
    auth_key: &str,
) -> Frame {
    let call_id = frame.call_id;
    let reply = match frame.message {
        Message::Call {
            method,
            token,
            body,
        } => {
            if !validate_token(&token, auth_key) {
                tracing::warn!(%peer_addr, %method, "Rejected call with invalid token");
                Message::fault(ErrorCode::AuthenticationFailed, "authentication failed")
            } else {
                match table.dispatch(&method, body).await {
                    Ok(body) => Message::Reply { body },
                    Err(e) => {
                        tracing::warn!(%peer_addr, %method, "Call failed: {}", e);
                        Message::fault(e.code(), e.to_string())
                    }
                }
            }
        }
        other => {
            tracing::debug!(%peer_addr, "Unexpected {:?} frame", other.message_type());
            Message::fault(ErrorCode::InvalidMessage, "expected a call")
        }
    };

    Frame::new(call_id, reply)
}
