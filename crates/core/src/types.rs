/// Jobs are identified by a stable server- or caller-assigned integer.
pub type JobId = i64;

/// Server-recognized client identity. May be reassigned by the server.
pub type ClientId = i64;

/// Sentinel for "no client ID issued yet".
pub const INVALID_CLIENT_ID: ClientId = -1;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
