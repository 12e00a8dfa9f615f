//! Per-job state machine.
//!
//! A [`JobHandler`] owns exactly one [`Job`] and drives it through the
//! lifecycle in response to server messages. The transition table is
//! closed: a message that is not valid for the current state is ignored
//! and logged, never escalated — the server may redeliver or race messages
//! after a reconnect, and a locally cancelled job may still receive a
//! stale update.
//!
//! Handlers live for the whole connection; they are created when a job is
//! first scheduled or first reported by a session snapshot and never
//! evicted, because the server may reference the job ID again at any time.

use std::sync::Arc;

use remix_core::{Job, JobId, JobState, Timestamp, WebImage};
use remix_protocol::{JobMessageKind, JobSnapshot, SnapshotState};

use crate::listeners::{ConvertCallback, JobListener, NoopConvertCallback};

pub struct JobHandler {
    job: Job,
    /// Append-only converter console output, process-lifetime only.
    output: Vec<String>,
    callback: Arc<dyn ConvertCallback>,
}

impl JobHandler {
    pub fn new(job: Job, callback: Arc<dyn ConvertCallback>) -> Self {
        Self {
            job,
            output: Vec::new(),
            callback,
        }
    }

    /// Restore a handler from a server-pushed snapshot.
    ///
    /// The reported state is applied directly, bypassing the transition
    /// table: this is a resynchronization, not a live transition. A
    /// finished job maps to `ConversionFinished`; the facade decides
    /// whether to surface its download immediately.
    pub fn from_snapshot(snapshot: &JobSnapshot) -> Self {
        let image = snapshot.image_url.as_ref().map(|url| WebImage {
            url: url.clone(),
            width: snapshot.image_width.unwrap_or(0),
            height: snapshot.image_height.unwrap_or(0),
        });

        let mut job = Job::new(snapshot.job_id, snapshot.title.clone(), image);
        job.progress = snapshot.progress;
        job.already_downloaded = snapshot.already_downloaded;
        job.download_url = snapshot.download_url.clone();
        job.state = match snapshot.state {
            SnapshotState::Ready => JobState::Ready,
            SnapshotState::Running => JobState::Running,
            SnapshotState::Finished => JobState::ConversionFinished,
            SnapshotState::Failed => JobState::Failed,
        };

        Self::new(job, Arc::new(NoopConvertCallback))
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> JobId {
        self.job.job_id
    }

    pub fn state(&self) -> JobState {
        self.job.state
    }

    /// Converter console output received so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Rebind the completion callback. Done on every (re)schedule so the
    /// most recent caller receives the completion notifications.
    pub fn set_callback(&mut self, callback: Arc<dyn ConvertCallback>) {
        self.callback = callback;
    }

    /// Mark the job as scheduled and notify listeners.
    ///
    /// The caller has already passed the in-progress guard; this resets the
    /// job for a fresh run regardless of its previous state.
    pub fn on_scheduled(&mut self, listeners: &[Arc<dyn JobListener>]) {
        tracing::debug!(job_id = self.job.job_id, "Job scheduled");
        self.job.state = JobState::Scheduled;
        self.job.progress = 0.0;
        self.job.download_url = None;
        self.job.cached_at = None;
        for listener in listeners {
            listener.on_job_scheduled(&self.job);
        }
    }

    /// Apply one server message to this job.
    pub fn apply(&mut self, kind: &JobMessageKind, listeners: &[Arc<dyn JobListener>]) {
        match (self.job.state, kind) {
            (JobState::Scheduled, JobMessageKind::Ready) => self.handle_ready(listeners),
            (JobState::Scheduled, JobMessageKind::AlreadyRunning) => {
                // The job was running before we (re)scheduled it. Skip the
                // ready notification and synthesize the running transition.
                self.job.state = JobState::Ready;
                self.handle_running(listeners);
            }
            (JobState::Scheduled, JobMessageKind::Failed { msg }) => {
                self.handle_failed(msg, listeners)
            }
            (JobState::Scheduled, JobMessageKind::DownloadReady { url, cached_at }) => {
                self.handle_download_ready(url.clone(), *cached_at, listeners)
            }
            (JobState::Ready, JobMessageKind::Running) => self.handle_running(listeners),
            (JobState::Running, JobMessageKind::Progress { value }) => {
                self.handle_progress(*value, listeners)
            }
            (JobState::Running, JobMessageKind::Output { lines }) => {
                self.handle_output(lines, listeners)
            }
            (JobState::Running, JobMessageKind::Finished) => self.handle_finished(listeners),
            (JobState::Running, JobMessageKind::Failed { msg }) => {
                self.handle_failed(msg, listeners)
            }
            (JobState::ConversionFinished, JobMessageKind::DownloadReady { url, cached_at }) => {
                self.handle_download_ready(url.clone(), *cached_at, listeners)
            }
            (state, kind) => {
                tracing::warn!(
                    job_id = self.job.job_id,
                    ?state,
                    ?kind,
                    "Ignoring job message incompatible with current state",
                );
            }
        }
    }

    /// Local, optimistic cancel: reset immediately and let any late server
    /// message fall through the transition table.
    pub fn on_user_canceled_conversion(&mut self) {
        tracing::debug!(job_id = self.job.job_id, "User canceled conversion, resetting job");
        self.reset();
    }

    /// The external download executor finished fetching the result.
    pub fn on_download_finished(&mut self) {
        tracing::debug!(job_id = self.job.job_id, "Download finished, resetting job");
        self.job.already_downloaded = true;
        self.reset();
    }

    /// The user canceled the pending download.
    pub fn on_user_canceled_download(&mut self) {
        tracing::debug!(job_id = self.job.job_id, "User canceled download, resetting job");
        self.reset();
    }

    /// Surface a download that was already available in a restore snapshot.
    /// Bypasses the transition table for the same reason as
    /// [`from_snapshot`](Self::from_snapshot).
    pub fn surface_download_ready(&mut self, listeners: &[Arc<dyn JobListener>]) {
        let Some(url) = self.job.download_url.clone() else {
            tracing::warn!(job_id = self.job.job_id, "No download URL to surface");
            return;
        };
        self.handle_download_ready(url, self.job.cached_at, listeners);
    }

    fn reset(&mut self) {
        self.job.state = JobState::Unscheduled;
        self.job.download_url = None;
        self.job.cached_at = None;
    }

    fn handle_ready(&mut self, listeners: &[Arc<dyn JobListener>]) {
        self.job.state = JobState::Ready;
        self.callback.on_conversion_ready(&self.job);
        for listener in listeners {
            listener.on_job_ready(&self.job);
        }
    }

    fn handle_running(&mut self, listeners: &[Arc<dyn JobListener>]) {
        self.job.state = JobState::Running;
        self.callback.on_conversion_start(&self.job);
        for listener in listeners {
            listener.on_job_started(&self.job);
        }
    }

    fn handle_progress(&mut self, value: f64, listeners: &[Arc<dyn JobListener>]) {
        // Progress is monotonic while running; a stale lower value is
        // clamped rather than applied.
        let value = value.max(self.job.progress);
        self.job.progress = value;
        for listener in listeners {
            listener.on_job_progress(&self.job, value);
        }
    }

    fn handle_output(&mut self, lines: &[String], listeners: &[Arc<dyn JobListener>]) {
        self.output.extend_from_slice(lines);
        for listener in listeners {
            listener.on_job_output(&self.job, lines);
        }
    }

    fn handle_finished(&mut self, listeners: &[Arc<dyn JobListener>]) {
        self.job.state = JobState::ConversionFinished;
        self.callback.on_conversion_finished(&self.job);
        for listener in listeners {
            listener.on_job_finished(&self.job);
        }
    }

    fn handle_failed(&mut self, reason: &str, listeners: &[Arc<dyn JobListener>]) {
        tracing::warn!(job_id = self.job.job_id, reason, "Job failed");
        self.job.state = JobState::Failed;
        self.callback.on_conversion_failure(&self.job, reason);
        for listener in listeners {
            listener.on_job_failed(&self.job);
        }
    }

    fn handle_download_ready(
        &mut self,
        url: String,
        cached_at: Option<Timestamp>,
        listeners: &[Arc<dyn JobListener>],
    ) {
        self.job.state = JobState::DownloadReady;
        self.job.download_url = Some(url.clone());
        self.job.cached_at = cached_at;
        self.callback.on_download_ready(&self.job, &url, cached_at);
        for listener in listeners {
            listener.on_job_download_ready(&self.job);
        }
    }
}
