//! Inbound message types and the frame decoder.
//!
//! The server pushes two message families over one connection: session
//! messages (errors, client-ID assignment, bulk job snapshots) and per-job
//! messages (lifecycle updates for a single job). The envelope's `category`
//! field selects the family before any payload field is touched, and the
//! integer `type` field selects the variant within it.
//!
//! Decoding never panics: malformed frames come back as [`ProtocolError`]
//! and callers are expected to log and drop the single frame.

use chrono::NaiveDateTime;
use serde::Deserialize;

use remix_core::{ClientId, JobId, Timestamp};

/// Envelope category for session-level messages.
const CATEGORY_SESSION: u8 = 0;
/// Envelope category for per-job messages.
const CATEGORY_JOB: u8 = 1;

/// Fixed UTC format used for the download cache date.
const CACHED_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Connection/session-level message (not tied to a single job).
    Session(SessionMessage),
    /// Message targeting exactly one job.
    Job(JobMessage),
}

/// Session-level messages.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionMessage {
    /// Server-side error report. While authentication is pending this means
    /// the authentication was rejected.
    Error { msg: String },

    /// Bulk snapshot of every job the server knows for this client.
    /// Pushed after `retrieve_info`, used to resynchronize after reconnect.
    SessionInfo { jobs: Vec<JobSnapshot> },

    /// The server accepted (or reassigned) the client identity. The carried
    /// ID is authoritative and may differ from the one the client offered.
    ClientIdAssigned { client_id: ClientId },
}

/// A per-job message: the target job plus what happened to it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobMessage {
    pub job_id: JobId,
    pub kind: JobMessageKind,
}

/// What a job message reports.
#[derive(Debug, Clone, PartialEq)]
pub enum JobMessageKind {
    /// The conversion failed.
    Failed { msg: String },
    /// The conversion started running.
    Running,
    /// The job was already running when (re)scheduled.
    AlreadyRunning,
    /// The job was accepted and is waiting for a worker.
    Ready,
    /// Console output lines from the converter.
    Output { lines: Vec<String> },
    /// Progress update (0-100).
    Progress { value: f64 },
    /// The conversion finished; a download notification follows.
    Finished,
    /// The conversion result is downloadable.
    DownloadReady {
        url: String,
        /// When the server cached the result. `None` if the server sent an
        /// unparseable date; the message itself still applies.
        cached_at: Option<Timestamp>,
    },
}

/// One job as reported inside a [`SessionMessage::SessionInfo`] snapshot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobSnapshot {
    pub state: SnapshotState,
    #[serde(rename = "jobID")]
    pub job_id: JobId,
    pub title: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: Option<String>,
    #[serde(rename = "imageWidth", default)]
    pub image_width: Option<u32>,
    #[serde(rename = "imageHeight", default)]
    pub image_height: Option<u32>,
    #[serde(default)]
    pub progress: f64,
    #[serde(rename = "alreadyDownloaded", default)]
    pub already_downloaded: bool,
    #[serde(rename = "downloadURL", default)]
    pub download_url: Option<String>,
}

/// Job state as encoded in snapshot reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i32")]
pub enum SnapshotState {
    Ready,
    Running,
    Finished,
    Failed,
}

impl TryFrom<i32> for SnapshotState {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SnapshotState::Ready),
            1 => Ok(SnapshotState::Running),
            2 => Ok(SnapshotState::Finished),
            3 => Ok(SnapshotState::Failed),
            other => Err(format!("unknown snapshot state {other}")),
        }
    }
}

/// Errors produced while decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or a required field is missing or has
    /// the wrong type.
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The envelope `category` is neither session nor job.
    #[error("Unknown message category {0}")]
    UnknownCategory(u8),

    /// The envelope `type` is not a known discriminator for its category.
    #[error("Unknown message type {kind} in category {category}")]
    UnknownType { category: u8, kind: i32 },
}

/// Raw frame envelope, decoded before the family-specific payload.
#[derive(Deserialize)]
struct Envelope {
    category: u8,
    #[serde(rename = "type")]
    kind: i32,
    #[serde(default)]
    data: serde_json::Value,
}

// Payload shapes, one per wire variant that carries data.

#[derive(Deserialize)]
struct ErrorData {
    msg: String,
}

#[derive(Deserialize)]
struct SessionInfoData {
    #[serde(rename = "jobsInfo", default)]
    jobs_info: Vec<JobSnapshot>,
}

#[derive(Deserialize)]
struct ClientIdData {
    #[serde(rename = "clientID")]
    client_id: ClientId,
}

#[derive(Deserialize)]
struct JobIdData {
    #[serde(rename = "jobID")]
    job_id: JobId,
}

#[derive(Deserialize)]
struct JobFailedData {
    msg: String,
}

#[derive(Deserialize)]
struct JobOutputData {
    #[serde(default)]
    lines: Vec<String>,
}

#[derive(Deserialize)]
struct JobProgressData {
    progress: f64,
}

#[derive(Deserialize)]
struct JobDownloadData {
    url: String,
    #[serde(rename = "cachedUTCDate", default)]
    cached_utc_date: Option<String>,
}

/// Decode one inbound frame.
///
/// Returns `Ok(None)` for empty/whitespace payloads (some servers send
/// keepalive blanks); those are a no-op, not an error. Unknown
/// discriminators and missing fields yield a [`ProtocolError`] so the
/// caller can drop the single frame without touching connection state.
pub fn decode(text: &str) -> Result<Option<Message>, ProtocolError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.category {
        CATEGORY_SESSION => decode_session(&envelope).map(|m| Some(Message::Session(m))),
        CATEGORY_JOB => decode_job(&envelope).map(|m| Some(Message::Job(m))),
        other => Err(ProtocolError::UnknownCategory(other)),
    }
}

fn decode_session(envelope: &Envelope) -> Result<SessionMessage, ProtocolError> {
    let data = envelope.data.clone();
    match envelope.kind {
        0 => {
            let d: ErrorData = serde_json::from_value(data)?;
            Ok(SessionMessage::Error { msg: d.msg })
        }
        9 => {
            let d: SessionInfoData = serde_json::from_value(data)?;
            Ok(SessionMessage::SessionInfo { jobs: d.jobs_info })
        }
        10 => {
            let d: ClientIdData = serde_json::from_value(data)?;
            Ok(SessionMessage::ClientIdAssigned {
                client_id: d.client_id,
            })
        }
        kind => Err(ProtocolError::UnknownType {
            category: CATEGORY_SESSION,
            kind,
        }),
    }
}

fn decode_job(envelope: &Envelope) -> Result<JobMessage, ProtocolError> {
    let JobIdData { job_id } = serde_json::from_value(envelope.data.clone())?;
    let data = envelope.data.clone();

    let kind = match envelope.kind {
        1 => {
            let d: JobFailedData = serde_json::from_value(data)?;
            JobMessageKind::Failed { msg: d.msg }
        }
        2 => JobMessageKind::Running,
        3 => JobMessageKind::AlreadyRunning,
        4 => JobMessageKind::Ready,
        5 => {
            let d: JobOutputData = serde_json::from_value(data)?;
            JobMessageKind::Output { lines: d.lines }
        }
        6 => {
            let d: JobProgressData = serde_json::from_value(data)?;
            JobMessageKind::Progress { value: d.progress }
        }
        7 => JobMessageKind::Finished,
        8 => {
            let d: JobDownloadData = serde_json::from_value(data)?;
            let cached_at = d.cached_utc_date.as_deref().and_then(parse_cached_date);
            JobMessageKind::DownloadReady {
                url: d.url,
                cached_at,
            }
        }
        kind => {
            return Err(ProtocolError::UnknownType {
                category: CATEGORY_JOB,
                kind,
            })
        }
    };

    Ok(JobMessage { job_id, kind })
}

/// Parse the fixed-format UTC cache date.
///
/// An unparseable date degrades to `None` rather than failing the whole
/// message; the server occasionally sends garbage here.
fn parse_cached_date(raw: &str) -> Option<Timestamp> {
    match NaiveDateTime::parse_from_str(raw, CACHED_DATE_FORMAT) {
        Ok(naive) => Some(naive.and_utc()),
        Err(e) => {
            tracing::warn!(raw, error = %e, "Unparseable cached date, dropping it");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn decode_empty_payload_is_noop() {
        assert_eq!(decode("").unwrap(), None);
        assert_eq!(decode("   \n\t ").unwrap(), None);
    }

    #[test]
    fn decode_error_message() {
        let json = r#"{"category":0,"type":0,"data":{"msg":"invalid client"}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Session(SessionMessage::Error {
                msg: "invalid client".into()
            })
        );
    }

    #[test]
    fn decode_client_id_assigned() {
        let json = r#"{"category":0,"type":10,"data":{"clientID":7}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Session(SessionMessage::ClientIdAssigned { client_id: 7 })
        );
    }

    #[test]
    fn decode_session_info_with_jobs() {
        let json = r#"{"category":0,"type":9,"data":{"jobsInfo":[
            {"state":2,"jobID":9,"title":"Pong","imageURL":"https://img/9.png",
             "imageWidth":480,"imageHeight":360,"progress":100.0,
             "alreadyDownloaded":false,"downloadURL":"https://dl/9.zip"}
        ]}}"#;
        let msg = decode(json).unwrap().unwrap();
        let Message::Session(SessionMessage::SessionInfo { jobs }) = msg else {
            panic!("expected SessionInfo");
        };
        assert_eq!(jobs.len(), 1);
        let snap = &jobs[0];
        assert_eq!(snap.job_id, 9);
        assert_eq!(snap.state, SnapshotState::Finished);
        assert_eq!(snap.title, "Pong");
        assert_eq!(snap.image_url.as_deref(), Some("https://img/9.png"));
        assert_eq!(snap.download_url.as_deref(), Some("https://dl/9.zip"));
        assert!(!snap.already_downloaded);
    }

    #[test]
    fn decode_session_info_empty_list() {
        let json = r#"{"category":0,"type":9,"data":{"jobsInfo":[]}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Session(SessionMessage::SessionInfo { jobs: vec![] })
        );
    }

    #[test]
    fn decode_snapshot_with_unknown_state_is_error() {
        let json = r#"{"category":0,"type":9,"data":{"jobsInfo":[
            {"state":42,"jobID":1,"title":"x"}
        ]}}"#;
        assert!(matches!(decode(json), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn decode_job_failed() {
        let json = r#"{"category":1,"type":1,"data":{"jobID":42,"msg":"conversion error"}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Failed {
                    msg: "conversion error".into()
                }
            })
        );
    }

    #[test]
    fn decode_job_running() {
        let json = r#"{"category":1,"type":2,"data":{"jobID":42}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Running
            })
        );
    }

    #[test]
    fn decode_job_already_running() {
        let json = r#"{"category":1,"type":3,"data":{"jobID":42}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::AlreadyRunning
            })
        );
    }

    #[test]
    fn decode_job_ready() {
        let json = r#"{"category":1,"type":4,"data":{"jobID":42}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Ready
            })
        );
    }

    #[test]
    fn decode_job_output_lines() {
        let json = r#"{"category":1,"type":5,"data":{"jobID":42,"lines":["a","b"]}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Output {
                    lines: vec!["a".into(), "b".into()]
                }
            })
        );
    }

    #[test]
    fn decode_job_progress() {
        let json = r#"{"category":1,"type":6,"data":{"jobID":42,"progress":55.0}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Progress { value: 55.0 }
            })
        );
    }

    #[test]
    fn decode_job_finished() {
        let json = r#"{"category":1,"type":7,"data":{"jobID":42}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::Finished
            })
        );
    }

    #[test]
    fn decode_job_download_with_cached_date() {
        let json = r#"{"category":1,"type":8,"data":{"jobID":42,
            "url":"https://dl/42.zip","cachedUTCDate":"2016-08-02 17:30:01"}}"#;
        let msg = decode(json).unwrap().unwrap();
        let expected = Utc.with_ymd_and_hms(2016, 8, 2, 17, 30, 1).unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::DownloadReady {
                    url: "https://dl/42.zip".into(),
                    cached_at: Some(expected)
                }
            })
        );
    }

    #[test]
    fn unparseable_cached_date_degrades_to_none() {
        let json = r#"{"category":1,"type":8,"data":{"jobID":42,
            "url":"https://dl/42.zip","cachedUTCDate":"last tuesday"}}"#;
        let msg = decode(json).unwrap().unwrap();
        assert_eq!(
            msg,
            Message::Job(JobMessage {
                job_id: 42,
                kind: JobMessageKind::DownloadReady {
                    url: "https://dl/42.zip".into(),
                    cached_at: None
                }
            })
        );
    }

    #[test]
    fn missing_cached_date_is_none() {
        let json = r#"{"category":1,"type":8,"data":{"jobID":42,"url":"https://dl/42.zip"}}"#;
        let msg = decode(json).unwrap().unwrap();
        let Message::Job(JobMessage {
            kind: JobMessageKind::DownloadReady { cached_at, .. },
            ..
        }) = msg
        else {
            panic!("expected DownloadReady");
        };
        assert_eq!(cached_at, None);
    }

    #[test]
    fn unknown_category_is_error() {
        let json = r#"{"category":5,"type":1,"data":{}}"#;
        assert!(matches!(
            decode(json),
            Err(ProtocolError::UnknownCategory(5))
        ));
    }

    #[test]
    fn unknown_session_type_is_error() {
        let json = r#"{"category":0,"type":99,"data":{}}"#;
        assert!(matches!(
            decode(json),
            Err(ProtocolError::UnknownType {
                category: 0,
                kind: 99
            })
        ));
    }

    #[test]
    fn unknown_job_type_is_error() {
        let json = r#"{"category":1,"type":99,"data":{"jobID":1}}"#;
        assert!(matches!(
            decode(json),
            Err(ProtocolError::UnknownType {
                category: 1,
                kind: 99
            })
        ));
    }

    #[test]
    fn job_message_without_job_id_is_error() {
        let json = r#"{"category":1,"type":2,"data":{}}"#;
        assert!(matches!(decode(json), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn invalid_json_is_error_not_panic() {
        assert!(matches!(
            decode("not json at all"),
            Err(ProtocolError::Json(_))
        ));
    }
}
