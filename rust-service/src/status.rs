//! Job progress records.
//!
//! Each job has one record holding an explicit state and a human-readable
//! message. Pollers only see the message and decide completion with
//! [`is_terminal`], which matches the message text against a fixed keyword
//! set. The keyword list is part of the wire contract.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::job::JobId;
use crate::store::{KvStore, StoreError};

/// Message written when a job is queued.
pub const INITIAL_MESSAGE: &str = "Working...";

/// Lowercase keywords marking a message as final.
const TERMINAL_KEYWORDS: &[&str] = &["done", "failed", "limited", "invalid", "error", "sorry"];

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("no job with id {0}")]
    NotFound(JobId),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Working,
    Done,
    Failed,
}

/// Stored progress of one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub state: JobState,
    pub message: String,
}

/// Whether a progress message tells a poller to stop.
pub fn is_terminal(message: &str) -> bool {
    let lower = message.to_lowercase();
    TERMINAL_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Progress records keyed by job identity.
#[derive(Clone)]
pub struct StatusStore {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl StatusStore {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(id: &JobId) -> String {
        format!("status:{}", id)
    }

    async fn write(&self, id: &JobId, state: JobState, message: &str) -> Result<(), StatusError> {
        let record = StatusRecord {
            state,
            message: message.to_string(),
        };
        let body =
            serde_json::to_string(&record).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        self.store.set_ex(&Self::key(id), &body, self.ttl).await?;

        debug!(job_id = %id, state = ?state, message = %message, "status_written");
        Ok(())
    }

    /// Write the default record for a freshly queued job.
    pub async fn set_initial(&self, id: &JobId) -> Result<(), StatusError> {
        self.write(id, JobState::Working, INITIAL_MESSAGE).await
    }

    /// Overwrite the record with an intermediate message.
    pub async fn set_progress(&self, id: &JobId, message: &str) -> Result<(), StatusError> {
        self.write(id, JobState::Working, message).await
    }

    /// Record successful completion.
    pub async fn finish(&self, id: &JobId, message: &str) -> Result<(), StatusError> {
        self.write(id, JobState::Done, message).await
    }

    /// Record a failure. The message should carry a terminal keyword.
    pub async fn fail(&self, id: &JobId, message: &str) -> Result<(), StatusError> {
        self.write(id, JobState::Failed, message).await
    }

    pub async fn record(&self, id: &JobId) -> Result<StatusRecord, StatusError> {
        let raw = self
            .store
            .get(&Self::key(id))
            .await?
            .ok_or_else(|| StatusError::NotFound(id.clone()))?;

        serde_json::from_str(&raw).map_err(|e| StatusError::Store(StoreError::Corrupt(e.to_string())))
    }

    /// Current progress message.
    pub async fn get(&self, id: &JobId) -> Result<String, StatusError> {
        self.record(id).await.map(|r| r.message)
    }
}
