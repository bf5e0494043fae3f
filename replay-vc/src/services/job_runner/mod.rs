//! Conversion job runner
//!
//! Executes one job through its phases, checking for a stop request
//! before each:
//!
//! - **CHECKING_DEPENDENCIES**: external tools the job will need
//! - **DOWNLOADING_SOURCE**: fetch, fingerprint and copy (or sample) the source
//! - **SEPARATING**: vocal/instrumental stems, optional de-echo pass
//! - **CONVERTING**: voice model over the vocals
//! - **EXPORTING**: final mix and encoding
//!
//! Vocals-only jobs finish after separation. WAV artifacts get MP3
//! previews when ffmpeg is available.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::job_error::{JobError, JobOutcome};
use super::job_manager::{JobExecutor, JobHandle};
use crate::audio::ffmpeg;
use crate::cache::separation_cache::DEFAULT_LOCK_CAPACITY;
use crate::cache::SeparationCache;
use crate::capabilities::{ModelLoader, SourceFetcher, StemSeparator};
use crate::models::{ConversionRequest, JobPhase};
use crate::pipeline::PitchExtractor;

mod phase_conversion;
mod phase_dependencies;
mod phase_export;
mod phase_separation;
mod phase_source;

use phase_separation::Stems;
use phase_source::PreparedSource;

const PREVIEW_BITRATE: &str = "192k";

/// Where ffmpeg comes from
#[derive(Debug, Clone)]
pub enum FfmpegLocation {
    /// Look it up on `PATH` when each job starts
    Path,
    Fixed(PathBuf),
    /// Behave as if ffmpeg were not installed
    Disabled,
}

impl FfmpegLocation {
    fn resolve(&self) -> Option<PathBuf> {
        match self {
            FfmpegLocation::Path => ffmpeg::locate(),
            FfmpegLocation::Fixed(path) => Some(path.clone()),
            FfmpegLocation::Disabled => None,
        }
    }
}

/// [`JobExecutor`] for voice conversion jobs
pub struct ConversionJobRunner {
    separator: Arc<dyn StemSeparator>,
    model_loader: Arc<dyn ModelLoader>,
    fetcher: Arc<dyn SourceFetcher>,
    separation_cache: SeparationCache,
    pitch: Arc<PitchExtractor>,
    ffmpeg: FfmpegLocation,
}

impl ConversionJobRunner {
    pub fn new(
        separator: Arc<dyn StemSeparator>,
        model_loader: Arc<dyn ModelLoader>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Self {
        Self {
            separator,
            model_loader,
            fetcher,
            separation_cache: SeparationCache::new(DEFAULT_LOCK_CAPACITY),
            pitch: Arc::new(PitchExtractor::new()),
            ffmpeg: FfmpegLocation::Path,
        }
    }

    pub fn with_lock_capacity(mut self, capacity: usize) -> Self {
        self.separation_cache = SeparationCache::new(capacity);
        self
    }

    pub fn with_pitch_extractor(mut self, pitch: Arc<PitchExtractor>) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: FfmpegLocation) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    fn run(&self, request: &ConversionRequest, job: &JobHandle) -> Result<PathBuf, JobError> {
        let output_dir = request
            .output_directory
            .clone()
            .ok_or_else(|| JobError::Validation("outputDirectory is required".to_string()))?;
        let options = &request.options;

        job.enter_phase(JobPhase::CheckingDependencies, "Checking dependencies...")?;
        let ffmpeg = self.check_dependencies(request)?;

        job.enter_phase(JobPhase::DownloadingSource, "Preparing source audio...")?;
        let source = self.prepare_source(request, job, &output_dir)?;

        job.enter_phase(JobPhase::Separating, "Separating vocals...")?;
        let stems = self.separate_stems(request, job, &source, &output_dir)?;

        if options.vocals_only {
            job.checkpoint()?;
            self.render_previews(job, ffmpeg.as_deref());
            tracing::info!(job_id = %job.job_id(), "Vocals-only job finished after separation");
            return Ok(stems.vocals);
        }

        job.enter_phase(JobPhase::Converting, "Loading voice model...")?;
        let converted = self.convert_vocals(request, job, &stems, &output_dir)?;

        job.enter_phase(JobPhase::Exporting, "Mixing final track...")?;
        let output = self.export(
            request,
            job,
            &stems,
            &converted,
            &output_dir,
            ffmpeg.as_deref(),
        )?;

        job.update_artifacts(|a| a.output = Some(output.clone()));
        self.render_previews(job, ffmpeg.as_deref());
        Ok(output)
    }

    /// MP3 previews for every WAV artifact; failures are logged only
    fn render_previews(&self, job: &JobHandle, ffmpeg: Option<&Path>) {
        let Some(ffmpeg) = ffmpeg else {
            tracing::debug!(job_id = %job.job_id(), "ffmpeg not available, skipping previews");
            return;
        };
        job.set_message("Creating previews...");

        let artifacts = job.artifacts();
        let candidates = [
            artifacts.vocals,
            artifacts.converted_vocals,
            artifacts.instrumentals,
            artifacts.pre_deecho_vocals,
            artifacts.output,
        ];

        for wav in candidates.into_iter().flatten().filter(|p| is_wav(p)) {
            let preview = ffmpeg::preview_path(&wav);
            if preview.exists() {
                continue;
            }
            if let Err(e) = ffmpeg::encode_mp3(ffmpeg, &wav, &preview, PREVIEW_BITRATE) {
                tracing::warn!(
                    job_id = %job.job_id(),
                    file = %wav.display(),
                    error = %e,
                    "Failed to render preview"
                );
            }
        }
    }
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
}

impl JobExecutor for ConversionJobRunner {
    fn execute(&self, request: &ConversionRequest, job: &JobHandle) -> JobOutcome {
        self.run(request, job).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_wav() {
        assert!(is_wav(Path::new("/a/vocals.wav")));
        assert!(is_wav(Path::new("/a/VOCALS.WAV")));
        assert!(!is_wav(Path::new("/a/final.mp3")));
        assert!(!is_wav(Path::new("/a/noext")));
    }

    #[test]
    fn test_disabled_ffmpeg_resolves_to_none() {
        assert!(FfmpegLocation::Disabled.resolve().is_none());
        assert_eq!(
            FfmpegLocation::Fixed(PathBuf::from("/opt/ffmpeg")).resolve(),
            Some(PathBuf::from("/opt/ffmpeg"))
        );
    }
}
