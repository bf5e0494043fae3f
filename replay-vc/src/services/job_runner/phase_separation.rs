//! Phase 3: stem separation
//!
//! Pre-stemmed sources skip separation and are used as the vocal track.
//! Otherwise stems come from the separation cache under
//! `<output>/stems/`. With de-echo enabled the vocal stem is copied aside
//! and run through a second separation pass.

use std::path::{Path, PathBuf};

use replay_common::fingerprint::file_fingerprint;

use super::{ConversionJobRunner, PreparedSource};
use crate::capabilities::{find_stem_model, SeparationError, StemModel, DE_ECHO_MODEL};
use crate::models::ConversionRequest;
use crate::services::job_error::JobError;
use crate::services::job_manager::JobHandle;

#[derive(Debug, Clone)]
pub(super) struct Stems {
    pub vocals: PathBuf,
    /// `None` for pre-stemmed sources
    pub instrumentals: Option<PathBuf>,
}

impl ConversionJobRunner {
    pub(super) fn separate_stems(
        &self,
        request: &ConversionRequest,
        job: &JobHandle,
        source: &PreparedSource,
        output_dir: &Path,
    ) -> Result<Stems, JobError> {
        if request.options.pre_stemmed {
            tracing::info!(job_id = %job.job_id(), "Source is pre-stemmed, skipping separation");
            job.update_artifacts(|a| a.vocals = Some(source.path.clone()));
            return Ok(Stems {
                vocals: source.path.clone(),
                instrumentals: None,
            });
        }

        let model = find_stem_model(&request.options.stemming_method)
            .ok_or_else(|| SeparationError::UnknownModel(request.options.stemming_method.clone()))?;
        let stems_dir = output_dir.join("stems");
        let weights = request.weights_path.as_deref();

        job.set_message(format!("Separating vocals with {}...", model.name));
        let paths = self.run_separation(&source.path, &stems_dir, &source.track_name, model, weights)?;
        let mut vocals = paths.primary;
        let instrumentals = paths.secondary;
        job.update_artifacts(|a| {
            a.vocals = Some(vocals.clone());
            a.instrumentals = instrumentals.clone();
        });

        if request.options.de_echo_de_reverb {
            job.checkpoint()?;
            job.set_message("Removing echo and reverb...");
            let vocals_fingerprint = file_fingerprint(&vocals)?;
            let copies = stems_dir.join("vocals_copies");
            std::fs::create_dir_all(&copies)?;
            let copy = copies.join(format!("{}.wav", vocals_fingerprint));
            if !copy.is_file() {
                std::fs::copy(&vocals, &copy)?;
            }

            let de_echo = find_stem_model(DE_ECHO_MODEL)
                .ok_or_else(|| SeparationError::UnknownModel(DE_ECHO_MODEL.to_string()))?;
            let dry =
                self.run_separation(&copy, &stems_dir, &vocals_fingerprint, de_echo, weights)?;
            let pre_deecho = std::mem::replace(&mut vocals, dry.primary);
            tracing::debug!(
                job_id = %job.job_id(),
                vocals = %pre_deecho.display(),
                fingerprint = %vocals_fingerprint,
                "De-echo pass complete"
            );
            job.update_artifacts(|a| {
                a.pre_deecho_vocals = Some(pre_deecho.clone());
                a.vocals = Some(vocals.clone());
            });
        }

        Ok(Stems {
            vocals,
            instrumentals,
        })
    }

    fn run_separation(
        &self,
        input: &Path,
        stems_dir: &Path,
        track_name: &str,
        model: &StemModel,
        weights: Option<&Path>,
    ) -> Result<crate::capabilities::StemPaths, SeparationError> {
        self.separation_cache
            .separate_or_reuse(input, stems_dir, track_name, model, |outputs| {
                self.separator.separate(input, model, weights, outputs)
            })
    }
}
