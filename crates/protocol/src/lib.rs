//! Wire codec for the remix conversion protocol.
//!
//! The server speaks JSON over a persistent WebSocket. Inbound frames are
//! `{"category": <0|1>, "type": <int>, "data": {...}}` envelopes carrying
//! either a session-level or a per-job message; outbound frames are
//! `{"cmd": <name>, "args": {...}}` commands. This crate is pure and
//! stateless: [`decode`] turns a frame into a typed [`Message`] and
//! [`encode`] turns a [`Command`] into its wire form.

pub mod commands;
pub mod messages;

pub use commands::{encode, Command};
pub use messages::{
    decode, JobMessage, JobMessageKind, JobSnapshot, Message, ProtocolError, SessionMessage,
    SnapshotState,
};
