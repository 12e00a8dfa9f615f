//! Error taxonomy for the conversion client.
//!
//! Only [`ClientError::Transport`] and [`ClientError::Authentication`] are
//! connection-fatal; everything else is local and recoverable. Protocol
//! errors and job messages for unknown job IDs never surface here at all:
//! the dispatch path logs them and drops the single frame.

use remix_core::JobId;
use remix_protocol::ProtocolError;

/// Errors reported by the client facade and connection manager.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The transport could not be opened, or dropped mid-operation.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server rejected the offered client identity. The connection is
    /// unusable until a fresh `connect_and_authenticate` call.
    #[error("Authentication rejected: {0}")]
    Authentication(String),

    /// A schedule request was refused because the job is already in
    /// progress and the force flag was not set. Never reaches the wire.
    #[error("Job {0} is already in progress")]
    JobInProgress(JobId),

    /// An operation that requires a live connection was called without one.
    #[error("Not connected to the conversion server")]
    NotConnected,

    /// The connection was closed while an operation was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// An outbound command could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}
