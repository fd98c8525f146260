//! Per-project build workers.
//!
//! Each project gets one worker task fed by an unbounded queue, so builds of
//! the same project never overlap while different projects build in
//! parallel. A queued full or clean trigger supersedes everything queued
//! before it.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::BuildCoordinator;
use crate::error::IndexError;
use crate::model::{BuildReport, BuildTrigger};

type BuildResult = Result<BuildReport, IndexError>;

struct BuildJob {
    trigger: BuildTrigger,
    cancel: CancellationToken,
    reply: oneshot::Sender<BuildResult>,
}

/// Handle to one submitted build
pub struct BuildTicket {
    cancel: CancellationToken,
    reply: oneshot::Receiver<BuildResult>,
}

impl BuildTicket {
    /// Request cancellation; takes effect at the next resource boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> BuildResult {
        self.reply.await.unwrap_or(Err(IndexError::WorkerStopped))
    }
}

pub struct BuildQueue {
    coordinator: Arc<BuildCoordinator>,
    workers: DashMap<String, mpsc::UnboundedSender<BuildJob>>,
    root: CancellationToken,
}

impl BuildQueue {
    pub fn new(coordinator: Arc<BuildCoordinator>) -> Self {
        Self {
            coordinator,
            workers: DashMap::new(),
            root: CancellationToken::new(),
        }
    }

    pub fn coordinator(&self) -> &BuildCoordinator {
        &self.coordinator
    }

    /// Queue a build of `project`. Must be called inside a tokio runtime;
    /// the first submission for a project spawns its worker.
    pub fn submit(&self, project: &str, trigger: BuildTrigger) -> BuildTicket {
        let cancel = self.root.child_token();
        let (reply, receiver) = oneshot::channel();
        let job = BuildJob {
            trigger,
            cancel: cancel.clone(),
            reply,
        };

        if self.root.is_cancelled() {
            let _ = job.reply.send(Err(IndexError::WorkerStopped));
        } else {
            let sender = self
                .workers
                .entry(project.to_string())
                .or_insert_with(|| self.spawn_worker(project))
                .clone();
            if let Err(mpsc::error::SendError(job)) = sender.send(job) {
                warn!(project, "build worker is gone");
                let _ = job.reply.send(Err(IndexError::WorkerStopped));
            }
        }

        BuildTicket {
            cancel,
            reply: receiver,
        }
    }

    /// Cancel every queued and running build and stop accepting new ones
    pub fn shutdown(&self) {
        self.root.cancel();
        self.workers.clear();
    }

    fn spawn_worker(&self, project: &str) -> mpsc::UnboundedSender<BuildJob> {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(
            project.to_string(),
            Arc::clone(&self.coordinator),
            receiver,
        ));
        sender
    }
}

impl Drop for BuildQueue {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

async fn run_worker(
    project: String,
    coordinator: Arc<BuildCoordinator>,
    mut receiver: mpsc::UnboundedReceiver<BuildJob>,
) {
    let mut backlog: VecDeque<BuildJob> = VecDeque::new();
    loop {
        if backlog.is_empty() {
            match receiver.recv().await {
                Some(job) => backlog.push_back(job),
                None => break,
            }
        }
        while let Ok(job) = receiver.try_recv() {
            backlog.push_back(job);
        }
        supersede(&project, &mut backlog);

        let Some(job) = backlog.pop_front() else {
            continue;
        };
        let result = coordinator.build(&project, &job.trigger, &job.cancel).await;
        if job.reply.send(result).is_err() {
            debug!(project, "build result dropped by caller");
        }
    }
    debug!(project, "build worker stopped");
}

/// Answer every job queued before the last full or clean trigger
fn supersede(project: &str, backlog: &mut VecDeque<BuildJob>) {
    let Some(last) = backlog.iter().rposition(|j| j.trigger.supersedes_queue()) else {
        return;
    };
    for job in backlog.drain(..last) {
        debug!(project, trigger = job.trigger.as_str(), "build superseded");
        let _ = job.reply.send(Err(IndexError::Superseded));
    }
}
