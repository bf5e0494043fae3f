//! Job orchestration services

pub mod job_error;
pub mod job_manager;
pub mod job_runner;
pub mod status;

pub use job_error::{JobError, JobOutcome};
pub use job_manager::{JobExecutor, JobHandle, JobLifecycleManager};
pub use job_runner::{ConversionJobRunner, FfmpegLocation};
pub use status::{project, JobProgressRecord, UNKNOWN_JOB_STATUS};
