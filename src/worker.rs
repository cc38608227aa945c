//! Background job queue and worker pool for document processing.
//!
//! Jobs enter a bounded channel; a fixed set of workers drains it, so a
//! burst of uploads queues instead of saturating the AI providers. Each
//! submission hands back a [`JobHandle`] the caller can await for the
//! processing report. Jobs run under a wall-clock timeout; a timed-out
//! document is marked `failed` so it never sticks in `processing`.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use crate::context::AppContext;
use crate::error::{Error, Result};
use crate::models::{DocumentStatus, ProcessReport};
use crate::pipeline;

#[derive(Debug, Clone)]
pub enum Job {
    /// Full pipeline run for a document.
    Process { doc_id: String },
    /// Re-embed an already-processed document.
    Regenerate { doc_id: String },
}

impl Job {
    fn doc_id(&self) -> &str {
        match self {
            Job::Process { doc_id } | Job::Regenerate { doc_id } => doc_id,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Job::Process { .. } => "process",
            Job::Regenerate { .. } => "regenerate",
        }
    }
}

struct QueuedJob {
    job: Job,
    done: oneshot::Sender<Result<ProcessReport>>,
}

/// Await side of a submitted job.
pub struct JobHandle {
    rx: oneshot::Receiver<Result<ProcessReport>>,
}

impl JobHandle {
    /// Wait for the job to finish and return its report.
    pub async fn wait(self) -> Result<ProcessReport> {
        self.rx.await.unwrap_or_else(|_| Err(Error::JobLost))
    }
}

pub struct WorkerPool {
    tx: mpsc::Sender<QueuedJob>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn the configured number of workers over a shared queue.
    pub fn start(ctx: Arc<AppContext>) -> Self {
        let (tx, rx) = mpsc::channel::<QueuedJob>(ctx.config.worker.queue_depth);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..ctx.config.worker.workers)
            .map(|worker_id| {
                let ctx = Arc::clone(&ctx);
                let rx = Arc::clone(&rx);
                tokio::spawn(async move {
                    loop {
                        let queued = {
                            let mut guard = rx.lock().await;
                            guard.recv().await
                        };
                        let Some(queued) = queued else {
                            break;
                        };
                        info!(worker_id, kind = queued.job.kind(), doc_id = queued.job.doc_id(), "job started");
                        let result = run_job(&ctx, &queued.job).await;
                        if let Err(e) = &result {
                            error!(worker_id, doc_id = queued.job.doc_id(), error = %e, "job failed");
                        }
                        // Caller may have gone away; the job's effects are durable either way.
                        let _ = queued.done.send(result);
                    }
                })
            })
            .collect();

        Self { tx, workers }
    }

    /// Enqueue a job without blocking. A full queue is the caller's
    /// signal to back off.
    pub fn submit(&self, job: Job) -> Result<JobHandle> {
        let (done, rx) = oneshot::channel();
        self.tx
            .try_send(QueuedJob { job, done })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => Error::QueueFull,
                mpsc::error::TrySendError::Closed(_) => {
                    Error::Config("worker pool is shut down".to_string())
                }
            })?;
        Ok(JobHandle { rx })
    }

    /// Stop accepting jobs and wait for in-flight work to drain.
    pub async fn shutdown(self) {
        drop(self.tx);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn run_job(ctx: &AppContext, job: &Job) -> Result<ProcessReport> {
    let budget = Duration::from_secs(ctx.config.worker.job_timeout_secs);
    let doc_id = job.doc_id().to_string();

    let outcome = timeout(budget, async {
        match job {
            Job::Process { doc_id } => {
                pipeline::process_document(
                    &ctx.store,
                    &ctx.index,
                    ctx.model.as_ref(),
                    &ctx.config,
                    doc_id,
                )
                .await
            }
            Job::Regenerate { doc_id } => {
                pipeline::regenerate_embeddings(
                    &ctx.store,
                    &ctx.index,
                    ctx.model.as_ref(),
                    &ctx.config,
                    doc_id,
                )
                .await
            }
        }
    })
    .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!(doc_id, "job exceeded time budget");
            let detail = format!("timed out after {}s", ctx.config.worker.job_timeout_secs);
            if let Err(e) = ctx
                .store
                .set_status(&doc_id, DocumentStatus::Failed, Some(&detail))
                .await
            {
                error!(doc_id, error = %e, "failed to mark timed-out document");
            }
            Err(Error::JobTimeout(ctx.config.worker.job_timeout_secs))
        }
    }
}
