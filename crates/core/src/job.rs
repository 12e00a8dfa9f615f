//! The [`Job`] domain object and its lifecycle state.
//!
//! A job is one unit of conversion work identified by a stable [`JobId`].
//! The owning job handler mutates it; everyone else receives read-only
//! clones through listener notifications.

use serde::Serialize;

use crate::types::{JobId, Timestamp};

/// Reference to a preview image hosted by the conversion service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Lifecycle state of a conversion job.
///
/// Mirrors the per-job state machine: jobs move
/// `Unscheduled -> Scheduled -> Ready -> Running -> ConversionFinished ->
/// DownloadReady`, with `Failed` reachable from `Scheduled` and `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobState {
    Unscheduled,
    Scheduled,
    Ready,
    Running,
    ConversionFinished,
    DownloadReady,
    Failed,
}

impl JobState {
    /// A job is "in progress" in every state except `Unscheduled` and
    /// `Failed`. Only those two accept a new schedule request without the
    /// force flag.
    pub fn is_in_progress(&self) -> bool {
        !matches!(self, JobState::Unscheduled | JobState::Failed)
    }
}

/// One unit of conversion work.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub job_id: JobId,
    pub title: String,
    pub image: Option<WebImage>,
    /// Completion percentage (0-100). Monotonic while the job is running.
    pub progress: f64,
    pub state: JobState,
    pub already_downloaded: bool,
    pub download_url: Option<String>,
    /// When the server cached the conversion result, if it told us.
    pub cached_at: Option<Timestamp>,
}

impl Job {
    /// Create a fresh, unscheduled job.
    pub fn new(job_id: JobId, title: impl Into<String>, image: Option<WebImage>) -> Self {
        Self {
            job_id,
            title: title.into(),
            image,
            progress: 0.0,
            state: JobState::Unscheduled,
            already_downloaded: false,
            download_url: None,
            cached_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_job_starts_unscheduled() {
        let job = Job::new(42, "Tower Defense", None);
        assert_eq!(job.state, JobState::Unscheduled);
        assert_eq!(job.progress, 0.0);
        assert!(!job.already_downloaded);
    }

    #[test]
    fn in_progress_excludes_only_unscheduled_and_failed() {
        assert!(!JobState::Unscheduled.is_in_progress());
        assert!(!JobState::Failed.is_in_progress());
        assert!(JobState::Scheduled.is_in_progress());
        assert!(JobState::Ready.is_in_progress());
        assert!(JobState::Running.is_in_progress());
        assert!(JobState::ConversionFinished.is_in_progress());
        assert!(JobState::DownloadReady.is_in_progress());
    }
}
