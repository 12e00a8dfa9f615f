//! Shared test harness: a client driven over an injected wire.
//!
//! Tests attach an in-memory outbound channel instead of a real WebSocket,
//! feed inbound frames through `handle_frame`, and inspect the commands
//! the client writes.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use remix_client::{
    ClientConfig, ConvertCallback, ConverterClient, Job, JobListener, SessionListener,
};
use remix_core::{ClientId, Timestamp};

pub struct Harness {
    pub client: ConverterClient,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

/// A client with an attached wire, still unauthenticated.
pub async fn connected_client(offered_id: ClientId) -> Harness {
    let config = ClientConfig::new("ws://unused.invalid/ws").with_client_id(offered_id);
    let client = ConverterClient::new(config);
    let (tx, outbound) = mpsc::unbounded_channel();
    client.attach_wire(tx).await;
    Harness { client, outbound }
}

/// A client that has completed the connect/authenticate handshake.
pub async fn authenticated_client(assigned_id: ClientId) -> Harness {
    let mut harness = connected_client(assigned_id).await;

    let client = harness.client.clone();
    let connect = tokio::spawn(async move { client.connect_and_authenticate().await });

    let frame = harness.outbound.recv().await.expect("authenticate command");
    assert_eq!(cmd_name(&frame), "authenticate");

    harness
        .client
        .handle_frame(&format!(
            r#"{{"category":0,"type":10,"data":{{"clientID":{assigned_id}}}}}"#
        ))
        .await;

    let result = connect.await.expect("connect task panicked");
    assert_eq!(result.expect("authentication failed"), assigned_id);
    harness
}

/// Parse an outbound frame into JSON.
pub fn frame_json(frame: &str) -> serde_json::Value {
    serde_json::from_str(frame).expect("outbound frame is not valid JSON")
}

/// The `cmd` field of an outbound frame.
pub fn cmd_name(frame: &str) -> String {
    frame_json(frame)["cmd"]
        .as_str()
        .expect("frame has no cmd field")
        .to_string()
}

/// Records every notification it receives as a short tag, implementing all
/// three listener traits.
pub struct Recorder {
    events: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }
}

impl JobListener for Recorder {
    fn on_job_scheduled(&self, job: &Job) {
        self.push(format!("scheduled:{}", job.job_id));
    }
    fn on_job_ready(&self, job: &Job) {
        self.push(format!("ready:{}", job.job_id));
    }
    fn on_job_started(&self, job: &Job) {
        self.push(format!("started:{}", job.job_id));
    }
    fn on_job_progress(&self, job: &Job, progress: f64) {
        self.push(format!("progress:{}:{}", job.job_id, progress));
    }
    fn on_job_output(&self, job: &Job, lines: &[String]) {
        self.push(format!("output:{}:{}", job.job_id, lines.join("|")));
    }
    fn on_job_finished(&self, job: &Job) {
        self.push(format!("finished:{}", job.job_id));
    }
    fn on_job_failed(&self, job: &Job) {
        self.push(format!("failed:{}", job.job_id));
    }
    fn on_job_download_ready(&self, job: &Job) {
        self.push(format!("download:{}", job.job_id));
    }
}

impl SessionListener for Recorder {
    fn on_jobs_info(&self, jobs: &[Job]) {
        self.push(format!("jobs_info:{}", jobs.len()));
    }
    fn on_error(&self, msg: &str) {
        self.push(format!("error:{msg}"));
    }
    fn on_client_id_changed(&self, client_id: ClientId) {
        self.push(format!("client_id:{client_id}"));
    }
    fn on_connection_closed(&self) {
        self.push("connection_closed");
    }
}

impl ConvertCallback for Recorder {
    fn on_conversion_ready(&self, job: &Job) {
        self.push(format!("cb_ready:{}", job.job_id));
    }
    fn on_conversion_start(&self, job: &Job) {
        self.push(format!("cb_start:{}", job.job_id));
    }
    fn on_conversion_finished(&self, job: &Job) {
        self.push(format!("cb_finished:{}", job.job_id));
    }
    fn on_download_ready(&self, job: &Job, url: &str, _cached_at: Option<Timestamp>) {
        self.push(format!("cb_download:{}:{url}", job.job_id));
    }
    fn on_conversion_failure(&self, job: &Job, reason: &str) {
        self.push(format!("cb_failure:{}:{reason}", job.job_id));
    }
}
