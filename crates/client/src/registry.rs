//! Registry of live job handlers.
//!
//! The single source of truth for "does a handler exist for this job ID".
//! Shared between the dispatch path and the scheduling path; each handler
//! sits behind its own `Mutex` so state transitions for a given job are
//! serialized while independent jobs do not contend.
//!
//! There is no eviction: a handler, once created, lives until the client
//! is discarded.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use remix_core::JobId;

use crate::handler::JobHandler;

pub struct JobRegistry {
    inner: RwLock<HashMap<JobId, Arc<Mutex<JobHandler>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, job_id: JobId) -> Option<Arc<Mutex<JobHandler>>> {
        self.inner.read().await.get(&job_id).cloned()
    }

    pub async fn contains(&self, job_id: JobId) -> bool {
        self.inner.read().await.contains_key(&job_id)
    }

    pub async fn insert(&self, job_id: JobId, handler: Arc<Mutex<JobHandler>>) {
        self.inner.write().await.insert(job_id, handler);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
