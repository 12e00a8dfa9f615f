//! Shared domain types for the remix conversion client.

pub mod job;
pub mod types;

pub use job::{Job, JobState, WebImage};
pub use types::{ClientId, JobId, Timestamp, INVALID_CLIENT_ID};
