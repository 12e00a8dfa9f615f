//! Client configuration.

use remix_core::{ClientId, INVALID_CLIENT_ID};

use crate::error::ClientError;

/// Environment variable holding the WebSocket endpoint.
const ENV_WS_URL: &str = "REMIX_WS_URL";
/// Environment variable holding a previously issued client ID.
const ENV_CLIENT_ID: &str = "REMIX_CLIENT_ID";

/// Configuration for one [`ConverterClient`](crate::ConverterClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the conversion server,
    /// e.g. `wss://converter.example.org/ws`.
    pub ws_url: String,

    /// Client identity offered during authentication. Use
    /// [`INVALID_CLIENT_ID`] when no identity was persisted yet; the server
    /// assigns one and it should be stored for the next session.
    pub client_id: ClientId,
}

impl ClientConfig {
    /// Configuration for a first-time client with no persisted identity.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            client_id: INVALID_CLIENT_ID,
        }
    }

    /// Offer a previously persisted client ID during authentication.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    /// Build a configuration from `REMIX_WS_URL` and (optionally)
    /// `REMIX_CLIENT_ID`.
    pub fn from_env() -> Result<Self, ClientError> {
        let ws_url = std::env::var(ENV_WS_URL)
            .map_err(|_| ClientError::Config(format!("{ENV_WS_URL} is not set")))?;

        let client_id = match std::env::var(ENV_CLIENT_ID) {
            Ok(raw) => raw
                .parse::<ClientId>()
                .map_err(|_| ClientError::Config(format!("{ENV_CLIENT_ID} is not an integer")))?,
            Err(_) => INVALID_CLIENT_ID,
        };

        Ok(Self { ws_url, client_id })
    }
}
