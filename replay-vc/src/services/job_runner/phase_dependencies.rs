//! Phase 1: external tool checks
//!
//! Fails fast, before any file is written, when a tool the request will
//! need is missing.

use std::path::PathBuf;

use super::ConversionJobRunner;
use crate::audio::pitch_shift;
use crate::models::ConversionRequest;
use crate::services::job_error::JobError;

impl ConversionJobRunner {
    /// Returns the ffmpeg binary when one is available
    pub(super) fn check_dependencies(
        &self,
        request: &ConversionRequest,
    ) -> Result<Option<PathBuf>, JobError> {
        let options = &request.options;
        let ffmpeg = self.ffmpeg.resolve();

        if ffmpeg.is_none() && options.output_format.needs_encoder() && !options.vocals_only {
            return Err(JobError::Dependency(format!(
                "ffmpeg not found: required for {} output",
                options.output_format.as_str()
            )));
        }

        if !options.pre_stemmed && !self.separator.is_available() {
            return Err(JobError::Dependency(format!(
                "Stem separation backend '{}' is not available",
                self.separator.name()
            )));
        }

        let shifts_instrumentals = options.instrumentals_pitch.unwrap_or(0) != 0
            && !options.pre_stemmed
            && !options.vocals_only;
        if shifts_instrumentals && !pitch_shift::is_available() {
            return Err(JobError::Dependency(
                "Instrumental pitch shifting is unavailable in this build".to_string(),
            ));
        }

        tracing::debug!(
            ffmpeg = ?ffmpeg,
            separator = self.separator.name(),
            "Dependencies satisfied"
        );
        Ok(ffmpeg)
    }
}
