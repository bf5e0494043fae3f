//! Phase 2: source preparation
//!
//! Remote sources are downloaded first. The source is fingerprinted and
//! copied to `<output>/originals/` under its fingerprint, so identical
//! content maps to one working copy (and one set of cached stems) no
//! matter what it was called. Sample mode writes a 30 second excerpt
//! instead of a full copy.

use std::path::{Path, PathBuf};

use replay_common::fingerprint::file_fingerprint;

use super::ConversionJobRunner;
use crate::audio::{decode_audio_file, mix, wav};
use crate::models::ConversionRequest;
use crate::services::job_error::JobError;
use crate::services::job_manager::JobHandle;

/// The job's working copy of its source
#[derive(Debug, Clone)]
pub(super) struct PreparedSource {
    pub path: PathBuf,
    pub fingerprint: String,
    /// Stem of the working copy, used to key cached separations
    pub track_name: String,
}

impl ConversionJobRunner {
    pub(super) fn prepare_source(
        &self,
        request: &ConversionRequest,
        job: &JobHandle,
        output_dir: &Path,
    ) -> Result<PreparedSource, JobError> {
        let original = if request.is_remote() {
            job.set_message("Downloading source...");
            self.fetcher.fetch(
                request.song_url_or_file_path.trim(),
                &output_dir.join("downloads"),
            )?
        } else {
            PathBuf::from(&request.song_url_or_file_path)
        };
        if !original.is_file() {
            return Err(JobError::Validation(format!(
                "Source file not found: {}",
                original.display()
            )));
        }
        job.checkpoint()?;

        job.set_message("Fingerprinting source...");
        let fingerprint = file_fingerprint(&original)?;
        job.set_song_hash(&fingerprint);

        let originals_dir = output_dir.join("originals");
        std::fs::create_dir_all(&originals_dir)?;

        let options = &request.options;
        let working_copy = if options.sample_mode {
            let start = options.sample_mode_start_time;
            let path = originals_dir.join(format!(
                "sample_{}_{}.wav",
                fingerprint,
                start.floor() as u64
            ));
            if !path.is_file() {
                job.set_message("Cutting sample...");
                let excerpt = mix::sample_excerpt(decode_audio_file(&original)?, start)?;
                if excerpt.is_empty() {
                    return Err(JobError::Validation(format!(
                        "Sample start {}s is past the end of the source",
                        start
                    )));
                }
                wav::write_wav_f32_as_i16(&path, &excerpt)?;
            }
            path
        } else {
            let extension = original
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "audio".to_string());
            let path = originals_dir.join(format!("{}.{}", fingerprint, extension));
            if !path.is_file() {
                std::fs::copy(&original, &path)?;
            }
            path
        };

        let track_name = working_copy
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(fingerprint.as_str())
            .to_string();

        tracing::info!(
            job_id = %job.job_id(),
            fingerprint = %fingerprint,
            path = %working_copy.display(),
            "Source prepared"
        );
        job.update_artifacts(|a| a.input_path = Some(working_copy.clone()));

        Ok(PreparedSource {
            path: working_copy,
            fingerprint,
            track_name,
        })
    }
}
