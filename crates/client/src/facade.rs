//! Public client surface.
//!
//! [`ConverterClient`] is the one handle callers hold: connect and
//! authenticate, schedule conversions, resynchronize via session info, and
//! register listeners. Cloning is cheap; all clones share one connection,
//! registry and listener hub.

use std::sync::Arc;

use tokio::sync::Mutex;

use remix_core::{ClientId, Job, JobId};
use remix_protocol::{Command, JobSnapshot, SessionMessage, SnapshotState};

use crate::config::ClientConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::dispatcher;
use crate::error::ClientError;
use crate::handler::JobHandler;
use crate::listeners::{ConvertCallback, JobListener, ListenerHub, SessionListener};
use crate::registry::JobRegistry;

/// A schedule request accepted before authentication completed.
/// Flushed once the connection reaches `Authenticated`.
struct PendingSchedule {
    job: Job,
    force: bool,
    verbose: bool,
    callback: Arc<dyn ConvertCallback>,
}

pub(crate) struct ClientInner {
    config: ClientConfig,
    pub(crate) conn: ConnectionManager,
    pub(crate) registry: JobRegistry,
    pub(crate) listeners: ListenerHub,
    pending_schedules: Mutex<Vec<PendingSchedule>>,
}

/// Client for the remote conversion service.
#[derive(Clone)]
pub struct ConverterClient {
    inner: Arc<ClientInner>,
}

impl ConverterClient {
    pub fn new(config: ClientConfig) -> Self {
        let client_id = config.client_id;
        Self {
            inner: Arc::new(ClientInner {
                config,
                conn: ConnectionManager::new(client_id),
                registry: JobRegistry::new(),
                listeners: ListenerHub::new(),
                pending_schedules: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connect to the server and authenticate in one step.
    ///
    /// No-op success when already authenticated. On success the returned
    /// client ID is authoritative — it may differ from the offered one and
    /// should be persisted for the next session. Queued schedule requests
    /// are flushed before this returns.
    pub async fn connect_and_authenticate(&self) -> Result<ClientId, ClientError> {
        match self.inner.conn.state().await {
            ConnectionState::Authenticated => {
                tracing::debug!("Already authenticated");
                return Ok(self.inner.conn.client_id().await);
            }
            ConnectionState::Connected => {
                tracing::debug!("Already connected, authenticating");
            }
            ConnectionState::Disconnected | ConnectionState::Failed => {
                let (read, cancel) = self.inner.conn.open(&self.inner.config.ws_url).await?;
                tokio::spawn(dispatcher::run_read_loop(
                    Arc::clone(&self.inner),
                    read,
                    cancel,
                ));
            }
            ConnectionState::Connecting | ConnectionState::Authenticating => {
                return Err(ClientError::Transport(
                    "a connect attempt is already in flight".into(),
                ));
            }
        }

        let pending = self.inner.conn.begin_authentication().await?;
        let client_id = pending.await.map_err(|_| ClientError::ConnectionClosed)??;
        self.inner.flush_pending_schedules().await;
        Ok(client_id)
    }

    /// Close the connection. Requires a live transport.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.inner.conn.close().await
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.conn.state().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.conn.is_authenticated().await
    }

    /// Most recent server-issued client ID ([`remix_core::INVALID_CLIENT_ID`]
    /// until one was assigned).
    pub async fn client_id(&self) -> ClientId {
        self.inner.conn.client_id().await
    }

    /// Ask the server for a snapshot of every job it knows for this client.
    /// The answer arrives as a `SessionInfo` push and fans out through
    /// [`SessionListener::on_jobs_info`].
    pub async fn retrieve_info(&self) -> Result<(), ClientError> {
        if !self.inner.conn.is_authenticated().await {
            return Err(ClientError::NotConnected);
        }
        self.inner.conn.send(&Command::RetrieveInfo {}).await
    }

    /// Schedule a conversion job.
    ///
    /// Fails with [`ClientError::JobInProgress`] when the job is already in
    /// flight and `force` is not set. Called before authentication, the
    /// request is queued and flushed once authentication succeeds.
    pub async fn schedule_job(
        &self,
        job: Job,
        force: bool,
        verbose: bool,
        callback: Arc<dyn ConvertCallback>,
    ) -> Result<(), ClientError> {
        if !self.inner.conn.is_authenticated().await {
            tracing::debug!(job_id = job.job_id, "Not authenticated yet, queueing schedule request");
            self.inner.pending_schedules.lock().await.push(PendingSchedule {
                job,
                force,
                verbose,
                callback,
            });
            return Ok(());
        }
        self.inner
            .schedule_authenticated(job, force, verbose, callback)
            .await
    }

    /// Locally cancel an in-flight conversion. Optimistic: the job resets
    /// immediately and late server messages for it are ignored by the
    /// transition table. Nothing is sent to the server.
    pub async fn cancel_conversion(&self, job_id: JobId) {
        match self.inner.registry.get(job_id).await {
            Some(handler) => handler.lock().await.on_user_canceled_conversion(),
            None => tracing::debug!(job_id, "No handler for job, nothing to cancel"),
        }
    }

    /// Cancel a pending result download: reset the job locally and tell the
    /// server to drop the prepared download if we are still connected.
    pub async fn cancel_download(&self, job_id: JobId) -> Result<(), ClientError> {
        if let Some(handler) = self.inner.registry.get(job_id).await {
            handler.lock().await.on_user_canceled_download();
        }
        if self.inner.conn.is_authenticated().await {
            self.inner
                .conn
                .send(&Command::CancelDownload { job_id })
                .await?;
        }
        Ok(())
    }

    /// Report from the external download executor that the result was
    /// fetched. Marks the job downloaded and resets it.
    pub async fn download_finished(&self, job_id: JobId) {
        match self.inner.registry.get(job_id).await {
            Some(handler) => handler.lock().await.on_download_finished(),
            None => tracing::debug!(job_id, "No handler for job, ignoring download report"),
        }
    }

    /// Read-only copy of a job's current data, if a handler exists for it.
    pub async fn job(&self, job_id: JobId) -> Option<Job> {
        let handler = self.inner.registry.get(job_id).await?;
        let job = handler.lock().await.job().clone();
        Some(job)
    }

    /// Converter console output received for a job so far.
    pub async fn job_output(&self, job_id: JobId) -> Option<Vec<String>> {
        let handler = self.inner.registry.get(job_id).await?;
        let output = handler.lock().await.output().to_vec();
        Some(output)
    }

    pub async fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.inner.listeners.add_session_listener(listener).await;
    }

    pub async fn add_global_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.inner.listeners.add_global_job_listener(listener).await;
    }

    pub async fn add_job_listener(&self, job_id: JobId, listener: Arc<dyn JobListener>) {
        self.inner.listeners.add_job_listener(job_id, listener).await;
    }

    /// Drive the client over a transport this crate does not own.
    ///
    /// Outbound frames are written to `outbound`; inbound frames must be
    /// fed through [`handle_frame`](Self::handle_frame) and transport loss
    /// reported via [`wire_closed`](Self::wire_closed).
    pub async fn attach_wire(&self, outbound: tokio::sync::mpsc::UnboundedSender<String>) {
        self.inner.conn.attach_wire(outbound).await;
    }

    /// Process one raw inbound frame. The built-in read loop routes through
    /// this same path.
    pub async fn handle_frame(&self, text: &str) {
        dispatcher::dispatch(&self.inner, text).await;
    }

    /// Tell the client that an attached transport has dropped.
    pub async fn wire_closed(&self) {
        self.inner.on_transport_closed().await;
    }
}

impl ClientInner {
    pub(crate) async fn on_session_message(&self, message: SessionMessage) {
        match message {
            SessionMessage::ClientIdAssigned { client_id } => {
                if let Some(changed) = self.conn.on_client_id_assigned(client_id).await {
                    if changed {
                        for listener in self.listeners.session_listeners().await {
                            listener.on_client_id_changed(client_id);
                        }
                    }
                }
            }
            SessionMessage::Error { msg } => {
                if self.conn.take_auth_failure(&msg).await {
                    return;
                }
                tracing::error!(msg = %msg, "Server reported an error");
                for listener in self.listeners.session_listeners().await {
                    listener.on_error(&msg);
                }
            }
            SessionMessage::SessionInfo { jobs } => self.on_session_info(jobs).await,
        }
    }

    /// Resynchronize from a server-pushed snapshot (typically after
    /// reconnect). Jobs with a live handler keep their local state — live
    /// transitions win over snapshots; unknown jobs get a handler seeded
    /// into the reported state.
    async fn on_session_info(&self, snapshots: Vec<JobSnapshot>) {
        let mut jobs = Vec::with_capacity(snapshots.len());

        for snapshot in snapshots {
            let job_id = snapshot.job_id;
            let handler = match self.registry.get(job_id).await {
                Some(existing) => existing,
                None => {
                    tracing::debug!(job_id, "Restoring job from session snapshot");
                    let handler = Arc::new(Mutex::new(JobHandler::from_snapshot(&snapshot)));
                    self.registry.insert(job_id, Arc::clone(&handler)).await;

                    // A finished job whose result was never fetched is
                    // immediately downloadable.
                    if snapshot.state == SnapshotState::Finished
                        && snapshot.download_url.is_some()
                        && !snapshot.already_downloaded
                    {
                        let listeners = self.listeners.job_listeners(job_id).await;
                        handler.lock().await.surface_download_ready(&listeners);
                    }
                    handler
                }
            };
            jobs.push(handler.lock().await.job().clone());
        }

        for listener in self.listeners.session_listeners().await {
            listener.on_jobs_info(&jobs);
        }
    }

    pub(crate) async fn on_transport_closed(&self) {
        if self.conn.on_transport_closed().await {
            for listener in self.listeners.session_listeners().await {
                listener.on_connection_closed();
            }
        }
    }

    async fn schedule_authenticated(
        &self,
        job: Job,
        force: bool,
        verbose: bool,
        callback: Arc<dyn ConvertCallback>,
    ) -> Result<(), ClientError> {
        let job_id = job.job_id;
        let client_id = self.conn.client_id().await;
        let listeners = self.listeners.job_listeners(job_id).await;

        if let Some(existing) = self.registry.get(job_id).await {
            let mut handler = existing.lock().await;
            if !force && handler.state().is_in_progress() {
                return Err(ClientError::JobInProgress(job_id));
            }
            handler.set_callback(callback);
            handler.on_scheduled(&listeners);
        } else {
            let mut handler = JobHandler::new(job, callback);
            handler.on_scheduled(&listeners);
            self.registry
                .insert(job_id, Arc::new(Mutex::new(handler)))
                .await;
        }

        self.conn
            .send(&Command::ScheduleJob {
                job_id,
                client_id,
                force,
                verbose,
            })
            .await
    }

    async fn flush_pending_schedules(&self) {
        let pending: Vec<PendingSchedule> =
            self.pending_schedules.lock().await.drain(..).collect();
        if pending.is_empty() {
            return;
        }

        tracing::debug!(count = pending.len(), "Flushing queued schedule requests");
        for request in pending {
            let job = request.job.clone();
            let callback = Arc::clone(&request.callback);
            if let Err(e) = self
                .schedule_authenticated(request.job, request.force, request.verbose, request.callback)
                .await
            {
                tracing::warn!(job_id = job.job_id, error = %e, "Queued schedule request failed");
                callback.on_conversion_failure(&job, &e.to_string());
            }
        }
    }
}
