//! Data models for replay-vc

pub mod job;
pub mod options;
pub mod request;

pub use job::{Job, JobArtifacts, JobPhase, JobProgress, JobStatus};
pub use options::{ConversionOptions, OutputFormat, PitchMethod, DEFAULT_STEMMING_METHOD};
pub use request::ConversionRequest;
