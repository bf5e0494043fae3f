//! Job lifecycle manager
//!
//! Owns the job table and the single worker that executes jobs in
//! submission order. Submission, status queries, stop and clear never wait
//! on the worker; the worker runs each job on the blocking thread pool and
//! only it mutates a job while the job is processing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use replay_common::events::{EventBus, ReplayEvent};

use super::job_error::{JobError, JobOutcome};
use crate::capabilities::find_stem_model;
use crate::models::{ConversionRequest, Job, JobArtifacts, JobPhase, JobStatus};
use crate::pipeline::PipelineObserver;

/// Runs one job to completion on a blocking thread
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(&self, request: &ConversionRequest, job: &JobHandle) -> JobOutcome;
}

struct JobRecord {
    job: Job,
    cancel: CancellationToken,
}

#[derive(Default)]
struct JobTable {
    records: HashMap<String, JobRecord>,
    /// Submission order, for listing
    order: Vec<String>,
}

struct Inner {
    jobs: RwLock<JobTable>,
    queue: mpsc::UnboundedSender<String>,
    event_bus: EventBus,
    default_output_dir: PathBuf,
    shutdown: CancellationToken,
}

impl Inner {
    fn read<R>(&self, f: impl FnOnce(&JobTable) -> R) -> R {
        f(&self.jobs.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn write<R>(&self, f: impl FnOnce(&mut JobTable) -> R) -> R {
        f(&mut self.jobs.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply `f` to a job; returns `None` when the job was cleared
    fn update_job<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.write(|table| table.records.get_mut(job_id).map(|r| f(&mut r.job)))
    }
}

/// Worker-side access to one job
///
/// Updates after the job was cleared are dropped.
pub struct JobHandle {
    job_id: String,
    cancel: CancellationToken,
    inner: Arc<Inner>,
}

impl JobHandle {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_stop_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Safe point: `Err(Stopped)` once a stop was requested
    pub fn checkpoint(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Checkpoint, then enter `phase`
    pub fn enter_phase(&self, phase: JobPhase, message: impl Into<String>) -> Result<(), JobError> {
        self.checkpoint()?;
        let message = message.into();
        tracing::info!(job_id = %self.job_id, phase = phase.as_str(), "{}", message);
        self.inner
            .update_job(&self.job_id, |job| job.enter_phase(phase, message.clone()));
        self.inner.event_bus.emit_lossy(ReplayEvent::JobPhaseChanged {
            job_id: self.job_id.clone(),
            phase: phase.as_str().to_string(),
            message,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub fn set_message(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(job_id = %self.job_id, "{}", message);
        self.inner
            .update_job(&self.job_id, |job| job.set_message(message));
    }

    pub fn update_progress(&self, current: usize, total: usize, message: impl Into<String>) {
        let message = message.into();
        self.inner.update_job(&self.job_id, |job| {
            job.update_progress(current, total, message.clone())
        });
        self.inner.event_bus.emit_lossy(ReplayEvent::JobProgress {
            job_id: self.job_id.clone(),
            current,
            total,
            message,
            timestamp: Utc::now(),
        });
    }

    /// Current artifact paths; empty once the job was cleared
    pub fn artifacts(&self) -> JobArtifacts {
        self.inner
            .read(|table| table.records.get(&self.job_id).map(|r| r.job.artifacts.clone()))
            .unwrap_or_default()
    }

    pub fn update_artifacts(&self, f: impl FnOnce(&mut JobArtifacts)) {
        self.inner.update_job(&self.job_id, |job| {
            f(&mut job.artifacts);
            job.touch();
        });
    }

    pub fn set_song_hash(&self, hash: &str) {
        self.inner.update_job(&self.job_id, |job| {
            job.song_hash = Some(hash.to_string());
            job.touch();
        });
    }
}

impl PipelineObserver for JobHandle {
    fn stage(&self, message: &str) {
        self.set_message(message);
    }

    fn chunk_completed(&self, done: usize, total: usize) {
        self.update_progress(done, total, format!("Converted chunk {}/{}", done, total));
    }
}

/// Job registry plus the FIFO worker
///
/// Cloning shares the same registry and worker.
#[derive(Clone)]
pub struct JobLifecycleManager {
    inner: Arc<Inner>,
}

impl JobLifecycleManager {
    /// Create the manager and spawn its worker on the current runtime
    pub fn start(
        executor: Arc<dyn JobExecutor>,
        event_bus: EventBus,
        default_output_dir: PathBuf,
    ) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            jobs: RwLock::new(JobTable::default()),
            queue,
            event_bus,
            default_output_dir,
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(run_worker(Arc::clone(&inner), executor, receiver));
        Self { inner }
    }

    /// Validate and enqueue a request, returning the new job id
    pub fn submit(&self, mut request: ConversionRequest) -> Result<String, JobError> {
        validate_request(&request)?;
        if request.output_directory.is_none() {
            request.output_directory = Some(self.inner.default_output_dir.clone());
        }

        let job_id = Uuid::new_v4().simple().to_string();
        let job = Job::new(job_id.clone(), request);
        let track_name = job.track_name.clone();

        self.inner.write(|table| {
            table.order.push(job_id.clone());
            table.records.insert(
                job_id.clone(),
                JobRecord {
                    job,
                    cancel: CancellationToken::new(),
                },
            );
        });

        tracing::info!(job_id = %job_id, track = %track_name, "Job queued");
        self.inner.event_bus.emit_lossy(ReplayEvent::JobQueued {
            job_id: job_id.clone(),
            track_name,
            timestamp: Utc::now(),
        });

        if self.inner.queue.send(job_id.clone()).is_err() {
            let reason = "Job worker is not running".to_string();
            self.inner.finish(&job_id, JobOutcome::Failed(JobError::Dependency(reason.clone())));
            return Err(JobError::Dependency(reason));
        }
        Ok(job_id)
    }

    /// Snapshot of a job
    pub fn snapshot(&self, job_id: &str) -> Option<Job> {
        self.inner
            .read(|table| table.records.get(job_id).map(|r| r.job.clone()))
    }

    pub fn status(&self, job_id: &str) -> Result<JobStatus, JobError> {
        self.snapshot(job_id)
            .map(|job| job.status)
            .ok_or_else(|| JobError::Validation(format!("Job not found: {}", job_id)))
    }

    /// All retained jobs in submission order
    pub fn list(&self) -> Vec<Job> {
        self.inner.read(|table| {
            table
                .order
                .iter()
                .filter_map(|id| table.records.get(id).map(|r| r.job.clone()))
                .collect()
        })
    }

    /// Ask a queued or running job to stop
    ///
    /// Returns `None` for an unknown job, `Some(false)` when the job has
    /// already finished. Repeated requests are harmless.
    pub fn request_stop(&self, job_id: &str) -> Option<bool> {
        let signalled = self.inner.write(|table| {
            let record = table.records.get_mut(job_id)?;
            if record.job.is_terminal() {
                return Some(false);
            }
            if !record.cancel.is_cancelled() {
                record.cancel.cancel();
                record.job.set_message("Stopping...".to_string());
            }
            Some(true)
        })?;
        if signalled {
            tracing::info!(job_id = %job_id, "Stop requested");
        }
        Some(signalled)
    }

    /// Forget a job; files on disk are left alone
    ///
    /// A queued job is dropped from the queue along with any pending stop
    /// request. A running job keeps running to its end, but its updates are
    /// discarded and queries report it as unknown.
    pub fn clear(&self, job_id: &str) -> bool {
        let removed = self.inner.write(|table| {
            let record = table.records.remove(job_id)?;
            table.order.retain(|id| id != job_id);
            Some(record)
        });
        let Some(record) = removed else {
            return false;
        };
        tracing::info!(
            job_id = %job_id,
            status = record.job.status.as_str(),
            "Job cleared"
        );
        self.inner.event_bus.emit_lossy(ReplayEvent::JobCleared {
            job_id: job_id.to_string(),
            timestamp: Utc::now(),
        });
        true
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    /// Stop the worker after the current job
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}

fn validate_request(request: &ConversionRequest) -> Result<(), JobError> {
    let options = &request.options;
    options.validate().map_err(JobError::Validation)?;

    if !options.pre_stemmed && find_stem_model(&options.stemming_method).is_none() {
        return Err(JobError::Validation(format!(
            "Unknown stemming model: {}",
            options.stemming_method
        )));
    }
    if request.song_url_or_file_path.trim().is_empty() {
        return Err(JobError::Validation("songUrlOrFilePath is required".to_string()));
    }
    if !request.is_remote() && !Path::new(&request.song_url_or_file_path).is_file() {
        return Err(JobError::Validation(format!(
            "Source file not found: {}",
            request.song_url_or_file_path
        )));
    }
    if request.needs_model() && request.model_path.is_none() {
        return Err(JobError::Validation("modelPath is required".to_string()));
    }
    Ok(())
}

async fn run_worker(
    inner: Arc<Inner>,
    executor: Arc<dyn JobExecutor>,
    mut receiver: mpsc::UnboundedReceiver<String>,
) {
    tracing::debug!("Job worker started");
    loop {
        let job_id = tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            next = receiver.recv() => match next {
                Some(job_id) => job_id,
                None => break,
            },
        };
        run_job(&inner, &executor, job_id).await;
    }
    tracing::debug!("Job worker stopped");
}

async fn run_job(inner: &Arc<Inner>, executor: &Arc<dyn JobExecutor>, job_id: String) {
    let started = inner.write(|table| {
        let record = table.records.get_mut(&job_id)?;
        record.job.transition_to(JobStatus::Processing);
        record.job.set_message("Starting up...".to_string());
        Some((record.job.request.clone(), record.cancel.clone()))
    });
    let Some((request, cancel)) = started else {
        tracing::debug!(job_id = %job_id, "Job cleared before start, skipping");
        return;
    };

    if cancel.is_cancelled() {
        inner.finish(&job_id, JobOutcome::Stopped);
        return;
    }

    tracing::info!(job_id = %job_id, "Job started");
    let handle = JobHandle {
        job_id: job_id.clone(),
        cancel,
        inner: Arc::clone(inner),
    };
    let executor = Arc::clone(executor);
    let outcome = match tokio::task::spawn_blocking(move || executor.execute(&request, &handle))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            let reason = if e.is_panic() {
                let panic = e.into_panic();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                format!("Worker panicked: {}", message)
            } else {
                "Worker task was cancelled".to_string()
            };
            tracing::error!(job_id = %job_id, "{}", reason);
            JobOutcome::Failed(JobError::Computation(reason))
        }
    };
    inner.finish(&job_id, outcome);
}

impl Inner {
    /// Record the terminal state; a pending stop turns failures into `Stopped`
    fn finish(&self, job_id: &str, outcome: JobOutcome) {
        let event = self.write(|table| {
            let record = table.records.get_mut(job_id)?;
            let job = &mut record.job;
            let now = Utc::now();
            let event = match outcome {
                JobOutcome::Completed { output } => {
                    job.transition_to(JobStatus::Completed);
                    job.message = "Complete!".to_string();
                    let output_path = output.display().to_string();
                    job.artifacts.output = Some(output);
                    tracing::info!(job_id = %job_id, output = %output_path, "Job completed");
                    ReplayEvent::JobCompleted {
                        job_id: job_id.to_string(),
                        output_path: Some(output_path),
                        timestamp: now,
                    }
                }
                JobOutcome::Failed(err) if !record.cancel.is_cancelled() => {
                    job.transition_to(JobStatus::Errored);
                    let reason = err.to_string();
                    job.message = format!("Error: {}", reason);
                    job.error = Some(reason.clone());
                    tracing::error!(job_id = %job_id, kind = err.kind(), error = %reason, "Job failed");
                    ReplayEvent::JobFailed {
                        job_id: job_id.to_string(),
                        error: reason,
                        timestamp: now,
                    }
                }
                JobOutcome::Stopped | JobOutcome::Failed(_) => {
                    job.transition_to(JobStatus::Stopped);
                    job.message = "Job stopped".to_string();
                    tracing::info!(job_id = %job_id, "Job stopped");
                    ReplayEvent::JobStopped {
                        job_id: job_id.to_string(),
                        timestamp: now,
                    }
                }
            };
            Some(event)
        });
        if let Some(event) = event {
            self.event_bus.emit_lossy(event);
        }
    }
}
