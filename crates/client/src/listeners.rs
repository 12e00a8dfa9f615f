//! Listener traits and the registration hub.
//!
//! Every trait method has a default no-op body, so callers implement only
//! the notifications they care about. Notifications are delivered inline on
//! the dispatch task: the core enforces no threading policy, and a listener
//! that needs a specific execution context should forward to it (channel,
//! spawn, event loop) from its callback body.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use remix_core::{ClientId, Job, JobId, Timestamp};

/// Per-job lifecycle notifications, fanned out to global listeners and to
/// listeners registered for the specific job.
pub trait JobListener: Send + Sync {
    fn on_job_scheduled(&self, _job: &Job) {}
    fn on_job_ready(&self, _job: &Job) {}
    fn on_job_started(&self, _job: &Job) {}
    fn on_job_progress(&self, _job: &Job, _progress: f64) {}
    fn on_job_output(&self, _job: &Job, _lines: &[String]) {}
    fn on_job_finished(&self, _job: &Job) {}
    fn on_job_failed(&self, _job: &Job) {}
    fn on_job_download_ready(&self, _job: &Job) {}
}

/// Session-level notifications: snapshots, server errors, identity changes
/// and connection loss.
pub trait SessionListener: Send + Sync {
    fn on_jobs_info(&self, _jobs: &[Job]) {}
    fn on_error(&self, _msg: &str) {}
    /// The server issued a different client ID than the one offered.
    /// Persist it; it is the authoritative identity for future sessions.
    fn on_client_id_changed(&self, _client_id: ClientId) {}
    fn on_connection_closed(&self) {}
}

/// Completion callback bound to one scheduled job. Rebound on every
/// (re)schedule; at most one per job.
pub trait ConvertCallback: Send + Sync {
    fn on_conversion_ready(&self, _job: &Job) {}
    fn on_conversion_start(&self, _job: &Job) {}
    fn on_conversion_finished(&self, _job: &Job) {}
    fn on_download_ready(&self, _job: &Job, _url: &str, _cached_at: Option<Timestamp>) {}
    fn on_conversion_failure(&self, _job: &Job, _reason: &str) {}
}

/// Callback for jobs restored from a server snapshot, where no caller ever
/// bound one.
pub struct NoopConvertCallback;

impl ConvertCallback for NoopConvertCallback {}

/// Registered listeners, shared between the dispatch path and the facade.
///
/// Registration is additive and idempotent per `(listener, job)` pair:
/// adding the same `Arc` twice never duplicates notifications.
pub struct ListenerHub {
    session: RwLock<Vec<Arc<dyn SessionListener>>>,
    global_job: RwLock<Vec<Arc<dyn JobListener>>>,
    per_job: RwLock<HashMap<JobId, Vec<Arc<dyn JobListener>>>>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self {
            session: RwLock::new(Vec::new()),
            global_job: RwLock::new(Vec::new()),
            per_job: RwLock::new(HashMap::new()),
        }
    }

    pub async fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        push_unique(&mut *self.session.write().await, listener);
    }

    pub async fn add_global_job_listener(&self, listener: Arc<dyn JobListener>) {
        push_unique(&mut *self.global_job.write().await, listener);
    }

    pub async fn add_job_listener(&self, job_id: JobId, listener: Arc<dyn JobListener>) {
        let mut per_job = self.per_job.write().await;
        push_unique(per_job.entry(job_id).or_default(), listener);
    }

    /// All session listeners, in registration order.
    pub async fn session_listeners(&self) -> Vec<Arc<dyn SessionListener>> {
        self.session.read().await.clone()
    }

    /// Job-specific listeners merged with the global ones, deduplicated so
    /// a listener registered both ways is notified once.
    pub async fn job_listeners(&self, job_id: JobId) -> Vec<Arc<dyn JobListener>> {
        let mut merged: Vec<Arc<dyn JobListener>> = self
            .per_job
            .read()
            .await
            .get(&job_id)
            .cloned()
            .unwrap_or_default();
        for listener in self.global_job.read().await.iter() {
            push_unique(&mut merged, Arc::clone(listener));
        }
        merged
    }
}

impl Default for ListenerHub {
    fn default() -> Self {
        Self::new()
    }
}

fn push_unique<T: ?Sized>(list: &mut Vec<Arc<T>>, listener: Arc<T>) {
    if !list.iter().any(|existing| Arc::ptr_eq(existing, &listener)) {
        list.push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder;
    impl JobListener for Recorder {}
    impl SessionListener for Recorder {}

    #[tokio::test]
    async fn duplicate_registration_is_idempotent() {
        let hub = ListenerHub::new();
        let listener: Arc<dyn JobListener> = Arc::new(Recorder);

        hub.add_job_listener(42, Arc::clone(&listener)).await;
        hub.add_job_listener(42, Arc::clone(&listener)).await;

        assert_eq!(hub.job_listeners(42).await.len(), 1);
    }

    #[tokio::test]
    async fn same_listener_global_and_per_job_is_merged_once() {
        let hub = ListenerHub::new();
        let listener: Arc<dyn JobListener> = Arc::new(Recorder);

        hub.add_job_listener(42, Arc::clone(&listener)).await;
        hub.add_global_job_listener(Arc::clone(&listener)).await;

        assert_eq!(hub.job_listeners(42).await.len(), 1);
    }

    #[tokio::test]
    async fn global_listeners_apply_to_every_job() {
        let hub = ListenerHub::new();
        hub.add_global_job_listener(Arc::new(Recorder)).await;

        assert_eq!(hub.job_listeners(1).await.len(), 1);
        assert_eq!(hub.job_listeners(2).await.len(), 1);
    }

    #[tokio::test]
    async fn per_job_listeners_do_not_leak_across_jobs() {
        let hub = ListenerHub::new();
        hub.add_job_listener(1, Arc::new(Recorder)).await;

        assert_eq!(hub.job_listeners(1).await.len(), 1);
        assert!(hub.job_listeners(2).await.is_empty());
    }
}
