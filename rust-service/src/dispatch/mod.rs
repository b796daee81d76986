//! Bounded job queue and fixed worker pool.
//!
//! ```text
//! queue() → mpsc (bounded) → worker 0..N → Pipeline::process()
//! ```
//!
//! `queue` waits while the channel is full; that wait is the only
//! backpressure in the system and no validated job is ever dropped.
//! Shutdown stops further dequeues and lets each worker finish the job it
//! already holds. Jobs still waiting in the queue are then failed with
//! [`RESTART_MESSAGE`] so their pollers see a terminal status.

pub mod worker;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collab::CollaboratorError;
use crate::inbound::BounceEvent;
use crate::job::{Job, JobId};
use crate::status::StatusError;

pub use worker::{JobOutcome, Pipeline, DONE_MESSAGE};

pub const RESTART_MESSAGE: &str = "Sorry, the server restarted before your article was processed";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    #[error("failed to record job status: {0}")]
    Status(#[from] StatusError),
}

type SharedReceiver = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Handle to the running worker pool. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    sender: mpsc::Sender<Job>,
    receiver: SharedReceiver,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pipeline: Arc<Pipeline>,
}

impl Dispatcher {
    /// Start `workers` workers behind a queue holding `queue_capacity` jobs.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn run(workers: usize, queue_capacity: usize, pipeline: Pipeline) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let receiver: SharedReceiver = Arc::new(Mutex::new(receiver));
        let pipeline = Arc::new(pipeline);

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&receiver),
                    shutdown.subscribe(),
                    Arc::clone(&pipeline),
                ))
            })
            .collect();

        info!(workers, queue_capacity, "dispatcher_started");

        Self {
            inner: Arc::new(DispatcherInner {
                sender,
                receiver,
                shutdown,
                workers: Mutex::new(handles),
                pipeline,
            }),
        }
    }

    fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Record the initial status and enqueue the job, waiting for room.
    pub async fn queue(&self, job: Job) -> Result<JobId, DispatchError> {
        if self.is_shutting_down() {
            return Err(DispatchError::ShuttingDown);
        }

        let id = job.id().clone();
        self.inner.pipeline.statuses.set_initial(&id).await?;

        if self.inner.sender.capacity() == 0 {
            warn!(job_id = %id, "queue_full_waiting");
        }

        if self.inner.sender.send(job).await.is_err() {
            // Queue closed while waiting for room.
            self.inner
                .pipeline
                .fail(&id, RESTART_MESSAGE.to_string())
                .await;
            return Err(DispatchError::ShuttingDown);
        }

        info!(job_id = %id, "job_queued");
        Ok(id)
    }

    /// Ask the delivery service to accept mail for a bounced recipient again.
    pub async fn reactivate(&self, bounce: &BounceEvent) -> Result<(), CollaboratorError> {
        self.inner.pipeline.mailer.reactivate(bounce).await
    }

    /// Stop dequeuing and wait for in-flight jobs to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let queued = self.inner.sender.max_capacity() - self.inner.sender.capacity();
        info!(queued_jobs_left = queued, "dispatcher_draining");

        let handles: Vec<_> = self.inner.workers.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "worker_join_failed");
            }
        }

        let mut receiver = self.inner.receiver.lock().await;
        receiver.close();

        let mut abandoned = 0usize;
        while let Ok(job) = receiver.try_recv() {
            warn!(job_id = %job.id(), "job_abandoned_on_shutdown");
            self.inner
                .pipeline
                .fail(job.id(), RESTART_MESSAGE.to_string())
                .await;
            abandoned += 1;
        }

        info!(abandoned_jobs = abandoned, "dispatcher_stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: SharedReceiver,
    mut shutdown: watch::Receiver<bool>,
    pipeline: Arc<Pipeline>,
) {
    info!(worker_id, "worker_started");

    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stopping| *stopping) => None,
            job = async { receiver.lock().await.recv().await } => job,
        };

        let Some(job) = next else {
            break;
        };

        let id = job.id().clone();
        let task_pipeline = Arc::clone(&pipeline);

        // A panicking collaborator takes down only its own task.
        match tokio::spawn(async move { task_pipeline.process(job).await }).await {
            Ok(outcome) => info!(worker_id, job_id = %id, outcome = ?outcome, "job_finished"),
            Err(e) => {
                error!(worker_id, job_id = %id, error = %e, "job_panicked");
                pipeline
                    .fail(&id, "Sorry, an internal error occurred".to_string())
                    .await;
            }
        }
    }

    info!(worker_id, "worker_stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use crate::status::is_terminal;
    use crate::testing::{pipeline, wait_status, wait_terminal, FakeMailer};

    fn job(url: &str) -> Job {
        Job::new("user@example.com", url).unwrap()
    }

    #[tokio::test]
    async fn test_queue_runs_job_to_done() {
        let mailer = Arc::new(FakeMailer::default());
        let pipeline = pipeline(mailer.clone());
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(2, 4, pipeline);

        let id = dispatcher.queue(job("http://example.com/a")).await.unwrap();

        assert_eq!(wait_terminal(&statuses, &id).await, DONE_MESSAGE);
        assert_eq!(mailer.delivered().len(), 1);
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_writes_initial_status() {
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = pipeline(Arc::new(FakeMailer::gated(gate.clone())));
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(1, 4, pipeline);

        let blocker = dispatcher.queue(job("http://example.com/a")).await.unwrap();
        wait_status(&statuses, &blocker, worker::EMAILING_MESSAGE).await;

        let id = dispatcher.queue(job("http://example.com/b")).await.unwrap();
        assert_eq!(statuses.get(&id).await.unwrap(), "Working...");

        gate.add_permits(2);
        wait_terminal(&statuses, &id).await;
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mailer = Arc::new(FakeMailer::default());
        let pipeline = pipeline(mailer.clone());
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(1, 8, pipeline);

        let broken = dispatcher
            .queue(job("http://example.com/fail-extract"))
            .await
            .unwrap();
        let panicking = dispatcher
            .queue(job("http://example.com/panic-convert"))
            .await
            .unwrap();
        let fine = dispatcher.queue(job("http://example.com/ok")).await.unwrap();

        assert!(wait_terminal(&statuses, &broken).await.starts_with("Sorry"));
        let panic_message = wait_terminal(&statuses, &panicking).await;
        assert!(panic_message.contains("error"));
        assert_eq!(wait_terminal(&statuses, &fine).await, DONE_MESSAGE);
        assert_eq!(mailer.delivered().len(), 1);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_queue_blocks_when_full() {
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = pipeline(Arc::new(FakeMailer::gated(gate.clone())));
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(1, 1, pipeline);

        // First job is held by the worker, second fills the queue.
        let first = dispatcher.queue(job("http://example.com/1")).await.unwrap();
        wait_status(&statuses, &first, worker::EMAILING_MESSAGE).await;
        dispatcher.queue(job("http://example.com/2")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(100),
            dispatcher.queue(job("http://example.com/3")),
        )
        .await;
        assert!(blocked.is_err(), "queue should wait while full");

        let waiting = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.queue(job("http://example.com/4")).await })
        };

        gate.add_permits(3);
        let id = waiting.await.unwrap().unwrap();
        assert_eq!(wait_terminal(&statuses, &id).await, DONE_MESSAGE);

        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_job() {
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = pipeline(Arc::new(FakeMailer::gated(gate.clone())));
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(1, 4, pipeline);

        let id = dispatcher.queue(job("http://example.com/slow")).await.unwrap();
        wait_status(&statuses, &id, worker::EMAILING_MESSAGE).await;

        let stopping = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.shutdown().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopping.is_finished(), "shutdown must wait for in-flight work");

        gate.add_permits(1);
        stopping.await.unwrap();

        let message = statuses.get(&id).await.unwrap();
        assert_eq!(message, DONE_MESSAGE);
        assert!(is_terminal(&message));
    }

    #[tokio::test]
    async fn test_shutdown_fails_jobs_left_in_queue() {
        let gate = Arc::new(Semaphore::new(0));
        let pipeline = pipeline(Arc::new(FakeMailer::gated(gate.clone())));
        let statuses = pipeline.statuses.clone();
        let dispatcher = Dispatcher::run(1, 4, pipeline);

        let first = dispatcher.queue(job("http://example.com/1")).await.unwrap();
        wait_status(&statuses, &first, worker::EMAILING_MESSAGE).await;
        let second = dispatcher.queue(job("http://example.com/2")).await.unwrap();

        let stopping = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.shutdown().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        gate.add_permits(2);
        stopping.await.unwrap();

        assert_eq!(statuses.get(&first).await.unwrap(), DONE_MESSAGE);
        let message = statuses.get(&second).await.unwrap();
        assert_eq!(message, RESTART_MESSAGE);
        assert!(is_terminal(&message));
    }

    #[test]
    fn test_release_profile_unwinds() {
        // Panic recovery in `worker_loop` needs unwinding in release builds.
        let manifest = include_str!("../../../Cargo.toml");
        assert!(!manifest.contains("panic = \"abort\""));
    }

    #[tokio::test]
    async fn test_queue_after_shutdown_rejected() {
        let dispatcher = Dispatcher::run(2, 2, pipeline(Arc::new(FakeMailer::default())));
        dispatcher.shutdown().await;

        let result = dispatcher.queue(job("http://example.com/late")).await;
        assert!(matches!(result, Err(DispatchError::ShuttingDown)));

        // Second shutdown is a no-op.
        dispatcher.shutdown().await;
    }

    #[tokio::test]
    async fn test_reactivate_delegates_to_mailer() {
        let mailer = Arc::new(FakeMailer::default());
        let dispatcher = Dispatcher::run(1, 1, pipeline(mailer.clone()));

        let bounce = BounceEvent {
            id: Some(7),
            message_id: "msg-0".to_string(),
            email: "user@example.com".to_string(),
            kind: None,
        };
        dispatcher.reactivate(&bounce).await.unwrap();

        assert_eq!(mailer.reactivated(), vec!["user@example.com".to_string()]);
        dispatcher.shutdown().await;
    }
}
