//! Phase 4: voice conversion of the vocal stem

use std::path::{Path, PathBuf};

use super::{ConversionJobRunner, Stems};
use crate::audio::{decode_mono, wav};
use crate::models::ConversionRequest;
use crate::pipeline::normalize::limit_input_peak;
use crate::pipeline::{ConversionParams, ConversionPipeline, ANALYSIS_SAMPLE_RATE};
use crate::services::job_error::JobError;
use crate::services::job_manager::JobHandle;

pub(super) const CONVERTED_VOCALS_FILE: &str = "converted_vocals.wav";

impl ConversionJobRunner {
    pub(super) fn convert_vocals(
        &self,
        request: &ConversionRequest,
        job: &JobHandle,
        stems: &Stems,
        output_dir: &Path,
    ) -> Result<PathBuf, JobError> {
        let model_dir = request
            .model_path
            .as_deref()
            .ok_or_else(|| JobError::Validation("modelPath is required".to_string()))?;
        let model = self.model_loader.load(model_dir)?;
        tracing::info!(
            job_id = %job.job_id(),
            model = model.name(),
            target_sample_rate = model.target_sample_rate(),
            "Voice model loaded"
        );
        job.checkpoint()?;

        job.set_message("Loading vocals...");
        let mut audio = decode_mono(&stems.vocals, ANALYSIS_SAMPLE_RATE)?.into_samples();
        limit_input_peak(&mut audio);

        let pipeline = ConversionPipeline::new(model, self.pitch.clone());
        let params = ConversionParams::from_options(&request.options);
        let converted = pipeline.convert(
            &audio,
            Some(&stems.vocals),
            &params,
            job.cancel_token(),
            job,
        )?;

        let path = output_dir
            .join(job.job_id())
            .join("audio-outputs")
            .join(CONVERTED_VOCALS_FILE);
        wav::write_wav_i16(&path, &converted)?;
        tracing::info!(
            job_id = %job.job_id(),
            path = %path.display(),
            sample_rate = converted.sample_rate(),
            "Converted vocals written"
        );

        job.update_artifacts(|a| a.converted_vocals = Some(path.clone()));
        Ok(path)
    }
}
