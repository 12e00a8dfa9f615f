//! Inbound frame pump and message routing.
//!
//! [`run_read_loop`] drains the WebSocket read half until the connection
//! drops or the client shuts down; every text frame goes through
//! [`dispatch`], which decodes it and routes session messages to the
//! facade's session handler and job messages to the matching handler in
//! the registry. Malformed frames and messages for unknown job IDs are
//! logged and dropped — the protocol allows both (stale server state,
//! redelivery after reconnect) and neither affects connection state.

use std::sync::Arc;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use remix_protocol::{decode, Message};

use crate::connection::WsRead;
use crate::facade::ClientInner;

/// Pump inbound frames until the transport drops, a receive error occurs,
/// or the token is cancelled. Reports transport loss to the connection
/// manager exactly once on exit.
pub(crate) async fn run_read_loop(
    inner: Arc<ClientInner>,
    mut read: WsRead,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => dispatch(&inner, &text).await,
                Some(Ok(WsMessage::Binary(_))) => {
                    tracing::trace!("Ignoring binary frame");
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => {
                    // Handled automatically by tungstenite.
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    tracing::info!(?frame, "Server closed the connection");
                    break;
                }
                Some(Ok(WsMessage::Frame(_))) => {}
                Some(Err(e)) => {
                    tracing::error!(error = %e, "WebSocket receive error");
                    break;
                }
                None => break,
            }
        }
    }

    inner.on_transport_closed().await;
}

/// Decode one frame and route the message to its handler.
pub(crate) async fn dispatch(inner: &ClientInner, text: &str) {
    match decode(text) {
        Ok(None) => {}
        Ok(Some(Message::Session(message))) => inner.on_session_message(message).await,
        Ok(Some(Message::Job(message))) => {
            let Some(handler) = inner.registry.get(message.job_id).await else {
                tracing::warn!(
                    job_id = message.job_id,
                    "No handler registered for job, dropping message",
                );
                return;
            };
            let listeners = inner.listeners.job_listeners(message.job_id).await;
            handler.lock().await.apply(&message.kind, &listeners);
        }
        Err(e) => {
            tracing::warn!(error = %e, raw = text, "Dropping malformed frame");
        }
    }
}
