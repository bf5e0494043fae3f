//! Conversion job state machine
//!
//! A job moves `Queued → Processing → {Completed | Errored | Stopped}`.
//! While `Processing` it reports one of the [`JobPhase`]s; phases are
//! informational only and a rerun always starts again from the top.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use replay_common::time::seconds_between;

use super::ConversionRequest;

/// Externally visible job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Errored,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Errored | JobStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Errored => "errored",
            JobStatus::Stopped => "stopped",
        }
    }
}

/// Sub-phase of `Processing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    /// External tools present
    CheckingDependencies,
    /// Source fetched, fingerprinted and copied
    DownloadingSource,
    /// Vocals split from the mix
    Separating,
    /// Voice model applied to the vocals
    Converting,
    /// Final mix written
    Exporting,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::CheckingDependencies => "checking_dependencies",
            JobPhase::DownloadingSource => "downloading_source",
            JobPhase::Separating => "separating",
            JobPhase::Converting => "converting",
            JobPhase::Exporting => "exporting",
        }
    }
}

/// Files produced (or reused) by a job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobArtifacts {
    /// Working copy of the source under `originals/`
    pub input_path: Option<PathBuf>,
    /// Vocals before the de-echo pass
    pub pre_deecho_vocals: Option<PathBuf>,
    pub vocals: Option<PathBuf>,
    pub instrumentals: Option<PathBuf>,
    pub converted_vocals: Option<PathBuf>,
    /// Final deliverable
    pub output: Option<PathBuf>,
}

/// Progress within the current phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub current: usize,
    pub total: usize,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    pub elapsed_seconds: u64,
    /// None until at least one unit of work finished
    pub estimated_remaining_seconds: Option<u64>,
}

impl Default for JobProgress {
    fn default() -> Self {
        Self {
            current: 0,
            total: 0,
            percentage: 0.0,
            elapsed_seconds: 0,
            estimated_remaining_seconds: None,
        }
    }
}

/// In-memory job record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    pub phase: Option<JobPhase>,
    /// Latest human-readable progress message
    pub message: String,
    pub error: Option<String>,
    pub request: ConversionRequest,
    pub track_name: String,
    pub model_id: String,
    /// Content fingerprint of the source, once known
    pub song_hash: Option<String>,
    pub artifacts: JobArtifacts,
    pub progress: JobProgress,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Refreshed by the worker on every update
    pub heartbeat_at: DateTime<Utc>,
    /// Start of the current phase, for remaining-time estimates
    pub phase_started_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a queued job
    pub fn new(job_id: String, request: ConversionRequest) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            status: JobStatus::Queued,
            phase: None,
            message: "Waiting to start...".to_string(),
            error: None,
            track_name: request.display_name(),
            model_id: request.display_model_id(),
            request,
            song_hash: None,
            artifacts: JobArtifacts::default(),
            progress: JobProgress::default(),
            submitted_at: now,
            started_at: None,
            ended_at: None,
            heartbeat_at: now,
            phase_started_at: None,
        }
    }

    /// Transition to new status
    pub fn transition_to(&mut self, new_status: JobStatus) {
        let now = Utc::now();
        self.status = new_status;
        self.heartbeat_at = now;

        match new_status {
            JobStatus::Processing => {
                self.started_at.get_or_insert(now);
            }
            JobStatus::Completed | JobStatus::Errored | JobStatus::Stopped => {
                self.ended_at = Some(now);
                self.progress.estimated_remaining_seconds = None;
            }
            JobStatus::Queued => {}
        }
    }

    /// Enter a processing phase, resetting per-phase progress
    pub fn enter_phase(&mut self, phase: JobPhase, message: String) {
        let now = Utc::now();
        self.phase = Some(phase);
        self.message = message;
        self.progress = JobProgress::default();
        self.phase_started_at = Some(now);
        self.heartbeat_at = now;
    }

    /// Update progress within the current phase
    pub fn update_progress(&mut self, current: usize, total: usize, message: String) {
        let now = Utc::now();
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.message = message;

        let phase_start = self.phase_started_at.unwrap_or(now);
        let elapsed = seconds_between(phase_start, now);
        self.progress.elapsed_seconds = elapsed;

        // Estimate remaining time
        if current > 0 && total > current {
            let rate = elapsed as f64 / current as f64;
            let remaining = ((total - current) as f64 * rate) as u64;
            self.progress.estimated_remaining_seconds = Some(remaining);
        } else {
            self.progress.estimated_remaining_seconds = None;
        }
        self.heartbeat_at = now;
    }

    /// Replace the progress message without touching counters
    pub fn set_message(&mut self, message: String) {
        self.message = message;
        self.heartbeat_at = Utc::now();
    }

    pub fn touch(&mut self) {
        self.heartbeat_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the worker has gone quiet for longer than `stale_after`
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after: chrono::Duration) -> bool {
        self.status == JobStatus::Processing && now - self.heartbeat_at > stale_after
    }
}
