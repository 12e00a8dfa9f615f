//! Client library for the remix conversion service.
//!
//! A [`ConverterClient`] holds one persistent WebSocket connection to the
//! conversion server, authenticates once per connection, and tracks each
//! submitted job through asynchronous, possibly out-of-order server pushes
//! until its result becomes downloadable. Jobs never block the caller:
//! every operation returns immediately and progress arrives through the
//! listener traits in [`listeners`].

pub mod config;
pub mod connection;
pub mod error;
pub mod facade;
pub mod handler;
pub mod listeners;
pub mod registry;

mod dispatcher;

pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use error::ClientError;
pub use facade::ConverterClient;
pub use listeners::{
    ConvertCallback, JobListener, ListenerHub, NoopConvertCallback, SessionListener,
};

pub use remix_core::{Job, JobId, JobState, WebImage, INVALID_CLIENT_ID};
