//! Background jobs for meeting runs
//!
//! This module provides:
//! - `JobRegistry`, the one shared table of job status and logs
//! - Channel-based log sinks (`JobLog`) handed to running jobs
//! - Polling snapshots and awaiting completion

use crate::error::{Error, Result};
use crate::types::JobId;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Status of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Registered but not started
    Queued,
    /// Currently executing
    Running,
    /// Finished with a result
    Succeeded,
    /// Finished with an error
    Failed,
}

impl JobStatus {
    /// Whether the job has finished
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Point-in-time copy of a job's state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Job identifier
    pub id: JobId,
    /// What the job does, e.g. `meeting:2024-09`
    pub kind: String,
    /// Current status
    pub status: JobStatus,
    /// Log lines in arrival order
    pub logs: Vec<String>,
    /// Result payload on success
    pub result: Option<serde_json::Value>,
    /// Error text on failure
    pub error: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Start timestamp
    pub started_at: Option<DateTime<Utc>>,
    /// Completion timestamp
    pub finished_at: Option<DateTime<Utc>>,
}

/// Log sink handed to a running job
#[derive(Debug, Clone)]
pub struct JobLog {
    tx: Option<mpsc::UnboundedSender<String>>,
}

impl JobLog {
    /// A sink that only emits tracing events
    pub fn detached() -> Self {
        Self { tx: None }
    }

    /// Append a line to the job log
    pub fn line(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::info!("{}", line);
        if let Some(tx) = &self.tx {
            // receiver only goes away once the job is finished
            let _ = tx.send(line);
        }
    }
}

struct JobEntry {
    snapshot: JobSnapshot,
    handle: Option<JoinHandle<JobSnapshot>>,
}

type Jobs = Arc<Mutex<HashMap<JobId, JobEntry>>>;

/// Registry of background jobs.
///
/// Construct once per process and share it by `Arc`; every job appends to
/// its own log through the registry's single lock.
#[derive(Default)]
pub struct JobRegistry {
    jobs: Jobs,
}

impl JobRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `f` in the background and return its job ID
    pub fn spawn<F, Fut>(&self, kind: impl Into<String>, f: F) -> JobId
    where
        F: FnOnce(JobLog) -> Fut + Send + 'static,
        Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
    {
        let id = JobId::new();
        let snapshot = JobSnapshot {
            id,
            kind: kind.into(),
            status: JobStatus::Queued,
            logs: Vec::new(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };

        // Register before spawning so the task always finds its entry
        self.jobs.lock().insert(
            id,
            JobEntry {
                snapshot,
                handle: None,
            },
        );

        let jobs = self.jobs.clone();
        let handle = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel::<String>();

            let drain_jobs = jobs.clone();
            let drain = tokio::spawn(async move {
                while let Some(line) = rx.recv().await {
                    if let Some(entry) = drain_jobs.lock().get_mut(&id) {
                        entry.snapshot.logs.push(line);
                    }
                }
            });

            if let Some(entry) = jobs.lock().get_mut(&id) {
                entry.snapshot.status = JobStatus::Running;
                entry.snapshot.started_at = Some(Utc::now());
            }

            let result = f(JobLog { tx: Some(tx) }).await;

            // every sender is dropped with the job future; flush what is left
            let _ = drain.await;

            let mut guard = jobs.lock();
            let Some(entry) = guard.get_mut(&id) else {
                return JobSnapshot {
                    id,
                    kind: String::new(),
                    status: JobStatus::Failed,
                    logs: Vec::new(),
                    result: None,
                    error: Some("job entry removed while running".to_string()),
                    created_at: Utc::now(),
                    started_at: None,
                    finished_at: Some(Utc::now()),
                };
            };

            let snapshot = &mut entry.snapshot;
            snapshot.finished_at = Some(Utc::now());
            match result {
                Ok(value) => {
                    snapshot.status = JobStatus::Succeeded;
                    snapshot.result = Some(value);
                }
                Err(e) => {
                    tracing::error!("job {} ({}) failed: {}", id, snapshot.kind, e);
                    snapshot.status = JobStatus::Failed;
                    snapshot.logs.push(format!("[error] {}", e));
                    snapshot.error = Some(e.to_string());
                }
            }
            snapshot.clone()
        });

        if let Some(entry) = self.jobs.lock().get_mut(&id) {
            entry.handle = Some(handle);
        }

        id
    }

    /// Current state of a job
    pub fn get(&self, id: JobId) -> Result<JobSnapshot> {
        self.jobs
            .lock()
            .get(&id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }

    /// All jobs, oldest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        let mut all: Vec<JobSnapshot> = self
            .jobs
            .lock()
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect();
        all.sort_by_key(|s| s.created_at);
        all
    }

    /// Wait for a job to finish and return its final state
    pub async fn wait(&self, id: JobId) -> Result<JobSnapshot> {
        let handle = {
            let mut jobs = self.jobs.lock();
            let entry = jobs
                .get_mut(&id)
                .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
            if entry.snapshot.status.is_finished() && entry.handle.is_none() {
                return Ok(entry.snapshot.clone());
            }
            entry
                .handle
                .take()
                .ok_or_else(|| Error::other(format!("job {} is already being awaited", id)))?
        };

        handle
            .await
            .map_err(|e| Error::other(format!("job {} panicked: {}", id, e)))
    }

    /// Drop finished jobs older than `older_than`; returns how many were removed
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut jobs = self.jobs.lock();
        let before = jobs.len();
        jobs.retain(|_, entry| {
            let s = &entry.snapshot;
            !(s.status.is_finished() && s.finished_at.is_some_and(|t| t < cutoff))
        });
        before - jobs.len()
    }
}
