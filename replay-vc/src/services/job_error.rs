//! Job failure taxonomy

use std::path::PathBuf;
use thiserror::Error;

use crate::capabilities::{FetchError, ModelError, SeparationError};
use crate::pipeline::PipelineError;

/// Why a job did not complete
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad input: missing file, unknown model name, out-of-range option
    #[error("{0}")]
    Validation(String),

    /// Missing external tool, model or backend
    #[error("{0}")]
    Dependency(String),

    /// Stop requested by the caller
    #[error("Job stopped")]
    Stopped,

    /// Failure inside a model, separator, codec or the filesystem
    #[error("{0}")]
    Computation(String),
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::Dependency(_) => "dependency",
            JobError::Stopped => "stopped",
            JobError::Computation(_) => "computation",
        }
    }
}

impl From<PipelineError> for JobError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Stopped => JobError::Stopped,
            PipelineError::EmptyInput => JobError::Validation(err.to_string()),
            PipelineError::Model(model) => model.into(),
            other => JobError::Computation(other.to_string()),
        }
    }
}

impl From<ModelError> for JobError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable(msg) => JobError::Dependency(msg),
            ModelError::Inference(_) => JobError::Computation(err.to_string()),
        }
    }
}

impl From<SeparationError> for JobError {
    fn from(err: SeparationError) -> Self {
        match err {
            SeparationError::SourceMissing(_) | SeparationError::UnknownModel(_) => {
                JobError::Validation(err.to_string())
            }
            SeparationError::Unavailable(_) => JobError::Dependency(err.to_string()),
            SeparationError::Failed(_) | SeparationError::Io(_) => {
                JobError::Computation(err.to_string())
            }
        }
    }
}

impl From<FetchError> for JobError {
    fn from(err: FetchError) -> Self {
        JobError::Computation(err.to_string())
    }
}

impl From<std::io::Error> for JobError {
    fn from(err: std::io::Error) -> Self {
        JobError::Computation(format!("IO error: {}", err))
    }
}

impl From<replay_common::Error> for JobError {
    fn from(err: replay_common::Error) -> Self {
        match err {
            replay_common::Error::NotFound(_) | replay_common::Error::InvalidInput(_) => {
                JobError::Validation(err.to_string())
            }
            _ => JobError::Computation(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::Computation(format!("{:#}", err))
    }
}

/// Result of running a job to its end
#[derive(Debug)]
pub enum JobOutcome {
    Completed { output: PathBuf },
    Stopped,
    Failed(JobError),
}

impl From<Result<PathBuf, JobError>> for JobOutcome {
    fn from(result: Result<PathBuf, JobError>) -> Self {
        match result {
            Ok(output) => JobOutcome::Completed { output },
            Err(JobError::Stopped) => JobOutcome::Stopped,
            Err(err) => JobOutcome::Failed(err),
        }
    }
}
