//! Status projection
//!
//! Maps a job snapshot to the record returned by progress queries.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::path::PathBuf;

use replay_common::time::seconds_between;

use crate::models::{ConversionOptions, Job, JobPhase};

/// Status reported for ids the manager does not know
pub const UNKNOWN_JOB_STATUS: &str = "unknown_job";

/// Externally visible progress of one job
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgressRecord {
    pub job_id: Option<String>,
    pub status: String,
    pub phase: Option<JobPhase>,
    pub message: String,
    pub error: Option<String>,
    pub percentage: Option<f64>,
    pub elapsed_seconds: Option<u64>,
    pub remaining_seconds: Option<u64>,
    pub output_filepath: Option<String>,
    pub input_filepath: Option<String>,
    pub pre_deecho_vocals_file: Option<String>,
    pub original_vocals_path: Option<String>,
    pub converted_vocals_path: Option<String>,
    pub instrumentals_path: Option<String>,
    pub options: Option<ConversionOptions>,
    pub model_id: Option<String>,
    pub song_hash: Option<String>,
    pub track_name: Option<String>,
    /// Processing, but no heartbeat within the stale interval
    pub stale: bool,
}

impl JobProgressRecord {
    fn unknown() -> Self {
        Self {
            job_id: None,
            status: UNKNOWN_JOB_STATUS.to_string(),
            phase: None,
            message: "Error: Job not found".to_string(),
            error: None,
            percentage: None,
            elapsed_seconds: None,
            remaining_seconds: None,
            output_filepath: None,
            input_filepath: None,
            pre_deecho_vocals_file: None,
            original_vocals_path: None,
            converted_vocals_path: None,
            instrumentals_path: None,
            options: None,
            model_id: None,
            song_hash: None,
            track_name: None,
            stale: false,
        }
    }
}

fn display(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.display().to_string())
}

/// Project a job (or its absence) at time `now`
pub fn project(job: Option<&Job>, now: DateTime<Utc>, stale_after: Duration) -> JobProgressRecord {
    let Some(job) = job else {
        return JobProgressRecord::unknown();
    };

    let elapsed_seconds = job
        .started_at
        .map(|started| seconds_between(started, job.ended_at.unwrap_or(now)));
    let percentage = (job.progress.total > 0).then_some(job.progress.percentage);
    let artifacts = &job.artifacts;

    JobProgressRecord {
        job_id: Some(job.job_id.clone()),
        status: job.status.as_str().to_string(),
        phase: job.phase,
        message: job.message.clone(),
        error: job.error.clone(),
        percentage,
        elapsed_seconds,
        remaining_seconds: job.progress.estimated_remaining_seconds,
        output_filepath: display(&artifacts.output),
        input_filepath: display(&artifacts.input_path)
            .or_else(|| Some(job.request.song_url_or_file_path.clone())),
        pre_deecho_vocals_file: display(&artifacts.pre_deecho_vocals),
        original_vocals_path: display(&artifacts.vocals),
        converted_vocals_path: display(&artifacts.converted_vocals),
        instrumentals_path: display(&artifacts.instrumentals),
        options: Some(job.request.options.clone()),
        model_id: Some(job.model_id.clone()),
        song_hash: job.song_hash.clone(),
        track_name: Some(job.track_name.clone()),
        stale: job.is_stale(now, stale_after),
    }
}
