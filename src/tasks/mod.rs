//! In-process background jobs
//!
//! Handlers enqueue a `Job` and return immediately. One worker task drains
//! the queue in FIFO order and runs the matching sync function. A failed job
//! is logged and dropped.

use crate::services::sync::{PullRequestEvent, SyncError, SyncService};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub type JobId = Uuid;

/// Receiving end of the queue, consumed by `run_worker`
pub type JobReceiver = UnboundedReceiver<(JobId, Job)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Re-fetch and re-parse the README of an article
    UpdateArticle { article_uuid: String },
    UpdatePullRequest(PullRequestEvent),
    /// Dispatch an update-template event to an article repository
    UpdateTemplate { article: String },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::UpdateArticle { .. } => "update_article",
            Job::UpdatePullRequest(_) => "update_pullrequest",
            Job::UpdateTemplate { .. } => "update_template",
        }
    }
}

#[derive(Clone)]
pub struct TaskQueue {
    sender: UnboundedSender<(JobId, Job)>,
}

impl TaskQueue {
    /// A queue and its receiver, without a worker
    pub fn channel() -> (Self, JobReceiver) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }

    /// A queue with a worker already draining it
    pub fn start(sync: Arc<SyncService>) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = Self::channel();
        let handle = tokio::spawn(run_worker(receiver, sync));
        (queue, handle)
    }

    /// Fire-and-forget; the id only identifies the job in logs
    pub fn enqueue(&self, job: Job) -> JobId {
        let id = Uuid::new_v4();
        let name = job.name();
        match self.sender.send((id, job)) {
            Ok(()) => tracing::debug!("Enqueued {} job {}", name, id),
            Err(_) => tracing::error!("Task worker is gone, dropped {} job {}", name, id),
        }
        id
    }
}

/// Run jobs until every `TaskQueue` handle is dropped
pub async fn run_worker(mut receiver: JobReceiver, sync: Arc<SyncService>) {
    tracing::info!("Task worker started");
    while let Some((id, job)) = receiver.recv().await {
        let name = job.name();
        match run_job(&sync, job).await {
            Ok(()) => tracing::debug!("Job {} ({}) finished", id, name),
            Err(e) => tracing::error!("Job {} ({}) failed: {}", id, name, e),
        }
    }
    tracing::info!("Task worker stopped");
}

pub async fn run_job(sync: &SyncService, job: Job) -> Result<(), SyncError> {
    match job {
        Job::UpdateArticle { article_uuid } => sync.update_article(&article_uuid).await,
        Job::UpdatePullRequest(event) => sync.update_pullrequest(&event).await,
        Job::UpdateTemplate { article } => sync.update_template(&article).await,
    }
}
