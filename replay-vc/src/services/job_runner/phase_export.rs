//! Phase 5: final mix
//!
//! The converted vocal is laid over the (optionally pitch-shifted)
//! instrumental. Pre-stemmed jobs have no instrumental and export the
//! converted vocal alone. MP3 output is encoded from a temporary WAV.

use std::path::{Path, PathBuf};

use super::{ConversionJobRunner, Stems};
use crate::audio::{decode_audio_file, ffmpeg, mix, pitch_shift, wav, AudioBuffer};
use crate::models::ConversionRequest;
use crate::services::job_error::JobError;
use crate::services::job_manager::JobHandle;

impl ConversionJobRunner {
    pub(super) fn export(
        &self,
        request: &ConversionRequest,
        job: &JobHandle,
        stems: &Stems,
        converted: &Path,
        output_dir: &Path,
        ffmpeg: Option<&Path>,
    ) -> Result<PathBuf, JobError> {
        let options = &request.options;
        let vocals = decode_audio_file(converted)?;

        let mixed = match (&stems.instrumentals, options.pre_stemmed) {
            (Some(instrumentals), false) => {
                let mut backing = decode_audio_file(instrumentals)?;
                let shift = options.instrumentals_pitch.unwrap_or(0);
                if shift != 0 {
                    job.set_message(format!("Shifting instrumentals by {} semitones...", shift));
                    backing = pitch_shift::shift_semitones(backing, shift)?;
                }
                job.checkpoint()?;
                job.set_message("Overlaying vocals...");
                mix::overlay(backing, vocals)?
            }
            _ => vocals,
        };
        job.checkpoint()?;

        let job_dir = output_dir.join(job.job_id());
        let output = job_dir.join(options.output_format.file_name());

        match options.output_format.bitrate() {
            None => wav::write_wav_f32_as_i16(&output, &mixed)?,
            Some(bitrate) => {
                let ffmpeg = ffmpeg
                    .ok_or_else(|| JobError::Dependency("ffmpeg not found".to_string()))?;
                job.set_message(format!("Encoding MP3 at {}...", bitrate));
                encode_via_temp_wav(ffmpeg, &mixed, &job_dir, &output, bitrate)?;
            }
        }

        tracing::info!(
            job_id = %job.job_id(),
            output = %output.display(),
            format = options.output_format.as_str(),
            "Final mix exported"
        );
        Ok(output)
    }
}

fn encode_via_temp_wav(
    ffmpeg: &Path,
    audio: &AudioBuffer<f32>,
    job_dir: &Path,
    output: &Path,
    bitrate: &str,
) -> anyhow::Result<()> {
    let temp = job_dir.join("final_mix_tmp.wav");
    wav::write_wav_f32_as_i16(&temp, audio)?;
    let result = ffmpeg::encode_mp3(ffmpeg, &temp, output, bitrate);
    if let Err(e) = std::fs::remove_file(&temp) {
        tracing::warn!(path = %temp.display(), error = %e, "Failed to remove temporary mix");
    }
    result
}
