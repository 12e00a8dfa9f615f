//! Connection manager: transport ownership and the connect/authenticate
//! state machine.
//!
//! [`ConnectionManager`] owns the WebSocket transport, tracks the session
//! state, and exposes `send`/`close`. Authentication is not independently
//! callable — it is part of the connect flow, because the protocol requires
//! it before any other command succeeds.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use remix_core::ClientId;
use remix_protocol::{encode, Command};

use crate::error::ClientError;

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsRead = SplitStream<WsStream>;

/// Lifecycle of the connection to the conversion server.
///
/// `Failed` is terminal until a fresh connect call; an unsolicited close is
/// only meaningful from `Authenticated` and leads back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Authenticated,
    Failed,
}

type ConnectResult = Result<ClientId, ClientError>;

pub(crate) struct ConnectionManager {
    state: RwLock<ConnectionState>,
    client_id: RwLock<ClientId>,
    /// Sender feeding the writer task. `None` while no transport is up.
    outbound: RwLock<Option<mpsc::UnboundedSender<String>>>,
    /// Completes the in-flight connect call once the server answers the
    /// authentication, or fails it on transport loss.
    pending_connect: Mutex<Option<oneshot::Sender<ConnectResult>>>,
    /// Cancels the writer and read-loop tasks of the current transport.
    transport_cancel: Mutex<Option<CancellationToken>>,
}

impl ConnectionManager {
    pub(crate) fn new(client_id: ClientId) -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            client_id: RwLock::new(client_id),
            outbound: RwLock::new(None),
            pending_connect: Mutex::new(None),
            transport_cancel: Mutex::new(None),
        }
    }

    pub(crate) async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub(crate) async fn client_id(&self) -> ClientId {
        *self.client_id.read().await
    }

    pub(crate) async fn is_authenticated(&self) -> bool {
        self.state().await == ConnectionState::Authenticated
    }

    /// Open the WebSocket transport and spawn the writer task.
    ///
    /// On success the connection is `Connected` and the returned read half
    /// plus token should be handed to the read loop. On failure the
    /// connection is `Failed` until the next connect attempt.
    pub(crate) async fn open(
        &self,
        ws_url: &str,
    ) -> Result<(WsRead, CancellationToken), ClientError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (stream, _response) = match connect_async(ws_url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write().await = ConnectionState::Failed;
                return Err(ClientError::Transport(format!(
                    "Failed to connect to {ws_url}: {e}"
                )));
            }
        };

        tracing::info!("Connected to conversion server at {ws_url}");

        let (sink, read) = stream.split();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        spawn_writer(sink, rx, cancel.child_token());

        *self.outbound.write().await = Some(tx);
        *self.transport_cancel.lock().await = Some(cancel.clone());
        *self.state.write().await = ConnectionState::Connected;

        Ok((read, cancel.child_token()))
    }

    /// Attach an already-established transport instead of opening one.
    ///
    /// Seam for embedding the client behind a transport this crate does not
    /// own; frames read from that transport are fed back through the
    /// facade's `handle_frame`.
    pub(crate) async fn attach_wire(&self, outbound: mpsc::UnboundedSender<String>) {
        *self.outbound.write().await = Some(outbound);
        *self.state.write().await = ConnectionState::Connected;
    }

    /// Send the authentication command and register the pending connect
    /// completion. Requires `Connected`.
    pub(crate) async fn begin_authentication(
        &self,
    ) -> Result<oneshot::Receiver<ConnectResult>, ClientError> {
        {
            let state = *self.state.read().await;
            if state != ConnectionState::Connected {
                return Err(ClientError::NotConnected);
            }
        }

        let (tx, rx) = oneshot::channel();
        *self.pending_connect.lock().await = Some(tx);
        *self.state.write().await = ConnectionState::Authenticating;

        let offered = self.client_id().await;
        tracing::debug!(client_id = offered, "Authenticating");
        self.send(&Command::Authenticate { client_id: offered })
            .await?;

        Ok(rx)
    }

    /// Send a command over the live transport.
    ///
    /// Calling this without a live transport is a caller bug; it fails fast
    /// with [`ClientError::NotConnected`].
    pub(crate) async fn send(&self, command: &Command) -> Result<(), ClientError> {
        let state = *self.state.read().await;
        if !matches!(
            state,
            ConnectionState::Connected
                | ConnectionState::Authenticating
                | ConnectionState::Authenticated
        ) {
            return Err(ClientError::NotConnected);
        }

        let frame = encode(command)?;
        tracing::debug!(frame = %frame, "Sending command");

        let outbound = self.outbound.read().await;
        let tx = outbound.as_ref().ok_or(ClientError::NotConnected)?;
        tx.send(frame)
            .map_err(|_| ClientError::Transport("writer task is gone".into()))
    }

    /// The server accepted the identity (possibly reassigning it).
    ///
    /// Returns `Some(changed)` when the assignment was applied, where
    /// `changed` says whether the ID differs from the offered one; `None`
    /// when the message arrived in an incompatible state and was ignored.
    pub(crate) async fn on_client_id_assigned(&self, assigned: ClientId) -> Option<bool> {
        {
            let mut state = self.state.write().await;
            match *state {
                ConnectionState::Connected | ConnectionState::Authenticating => {
                    *state = ConnectionState::Authenticated;
                }
                other => {
                    tracing::warn!(state = ?other, "Ignoring client ID assignment in unexpected state");
                    return None;
                }
            }
        }

        let changed = {
            let mut current = self.client_id.write().await;
            let changed = *current != assigned;
            *current = assigned;
            changed
        };
        if changed {
            tracing::info!(client_id = assigned, "Server assigned a new client ID");
        }

        if let Some(tx) = self.pending_connect.lock().await.take() {
            let _ = tx.send(Ok(assigned));
        }
        Some(changed)
    }

    /// Try to consume a server error as an authentication failure.
    ///
    /// Returns `true` if a connect was pending and has been failed; the
    /// connection is then `Failed` and the transport torn down. Returns
    /// `false` when the error belongs to the authenticated session instead.
    pub(crate) async fn take_auth_failure(&self, msg: &str) -> bool {
        let pending = {
            let state = *self.state.read().await;
            if !matches!(
                state,
                ConnectionState::Connected | ConnectionState::Authenticating
            ) {
                return false;
            }
            self.pending_connect.lock().await.take()
        };

        let Some(tx) = pending else {
            return false;
        };

        tracing::error!(msg, "Authentication rejected by server");
        *self.state.write().await = ConnectionState::Failed;
        self.teardown().await;
        let _ = tx.send(Err(ClientError::Authentication(msg.to_string())));
        true
    }

    /// Explicitly close the connection. Requires a live transport.
    pub(crate) async fn close(&self) -> Result<(), ClientError> {
        {
            let mut state = self.state.write().await;
            if !matches!(
                *state,
                ConnectionState::Connected
                    | ConnectionState::Authenticating
                    | ConnectionState::Authenticated
            ) {
                return Err(ClientError::NotConnected);
            }
            *state = ConnectionState::Disconnected;
        }

        self.teardown().await;
        if let Some(tx) = self.pending_connect.lock().await.take() {
            let _ = tx.send(Err(ClientError::ConnectionClosed));
        }
        tracing::info!("Connection closed");
        Ok(())
    }

    /// The transport dropped without an explicit `close` call.
    ///
    /// Returns `true` when session listeners should be told the connection
    /// closed — only from `Authenticated`, and only once: after an explicit
    /// close (state already `Disconnected`) this is a no-op.
    pub(crate) async fn on_transport_closed(&self) -> bool {
        let previous = {
            let mut state = self.state.write().await;
            let previous = *state;
            match previous {
                ConnectionState::Authenticated => *state = ConnectionState::Disconnected,
                ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::Authenticating => *state = ConnectionState::Failed,
                ConnectionState::Disconnected | ConnectionState::Failed => return false,
            }
            previous
        };

        self.teardown().await;

        if previous == ConnectionState::Authenticated {
            tracing::warn!("Connection to conversion server lost");
            return true;
        }

        if let Some(tx) = self.pending_connect.lock().await.take() {
            let _ = tx.send(Err(ClientError::Transport(
                "connection closed during authentication".into(),
            )));
        }
        false
    }

    async fn teardown(&self) {
        if let Some(cancel) = self.transport_cancel.lock().await.take() {
            cancel.cancel();
        }
        *self.outbound.write().await = None;
    }
}

/// Writer task: drains the outbound channel into the WebSocket sink until
/// cancelled or the channel closes.
fn spawn_writer(
    mut sink: SplitSink<WsStream, WsMessage>,
    mut rx: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.close().await;
                    break;
                }
                frame = rx.recv() => match frame {
                    Some(text) => {
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            tracing::error!(error = %e, "WebSocket send error");
                            break;
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        break;
                    }
                }
            }
        }
    });
}
