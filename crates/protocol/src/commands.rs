//! Outbound command types and the frame encoder.
//!
//! Commands serialize to `{"cmd": <name>, "args": {...}}` via the
//! adjacently-tagged serde representation.

use serde::Serialize;

use remix_core::{ClientId, JobId};

use crate::messages::ProtocolError;

/// A command sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cmd", content = "args", rename_all = "snake_case")]
pub enum Command {
    /// Offer a client identity. The server answers with `ClientIdAssigned`
    /// (possibly carrying a different, authoritative ID) or `Error`.
    Authenticate {
        #[serde(rename = "clientID")]
        client_id: ClientId,
    },

    /// Ask for a `SessionInfo` snapshot of all known jobs.
    RetrieveInfo {},

    /// Schedule (or force-reschedule) a conversion job.
    ScheduleJob {
        #[serde(rename = "jobID")]
        job_id: JobId,
        #[serde(rename = "clientID")]
        client_id: ClientId,
        force: bool,
        verbose: bool,
    },

    /// Cancel a pending result download.
    CancelDownload {
        #[serde(rename = "jobID")]
        job_id: JobId,
    },
}

/// Encode a command into its wire form.
pub fn encode(command: &Command) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(command)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encoded(command: &Command) -> serde_json::Value {
        serde_json::from_str(&encode(command).unwrap()).unwrap()
    }

    #[test]
    fn encode_authenticate() {
        let value = encoded(&Command::Authenticate { client_id: 7 });
        assert_eq!(value, json!({"cmd": "authenticate", "args": {"clientID": 7}}));
    }

    #[test]
    fn encode_retrieve_info_has_empty_args() {
        let value = encoded(&Command::RetrieveInfo {});
        assert_eq!(value, json!({"cmd": "retrieve_info", "args": {}}));
    }

    #[test]
    fn encode_schedule_job() {
        let value = encoded(&Command::ScheduleJob {
            job_id: 42,
            client_id: 7,
            force: true,
            verbose: false,
        });
        assert_eq!(
            value,
            json!({
                "cmd": "schedule_job",
                "args": {"jobID": 42, "clientID": 7, "force": true, "verbose": false}
            })
        );
    }

    #[test]
    fn encode_cancel_download() {
        let value = encoded(&Command::CancelDownload { job_id: 42 });
        assert_eq!(
            value,
            json!({"cmd": "cancel_download", "args": {"jobID": 42}})
        );
    }
}
