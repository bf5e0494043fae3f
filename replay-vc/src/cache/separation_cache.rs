//! Memoized stem separation
//!
//! A separation result is the pair of stem files under
//! `<output>/<sanitized model>/<track>/`. Once they exist on disk the result
//! is reused, including across restarts. Concurrent requests for the same
//! (source, output) pair are serialized so the separator runs at most once.

use std::path::{Path, PathBuf};
use std::sync::PoisonError;

use super::lock_table::BoundedLockTable;
use crate::capabilities::{SeparationError, StemModel, StemPaths};

pub const PRIMARY_STEM_FILE: &str = "vocals.wav";
pub const SECONDARY_STEM_FILE: &str = "no_vocals.wav";

pub const DEFAULT_LOCK_CAPACITY: usize = 256;

/// Directory name for a model: ASCII alphanumerics only
pub fn sanitize_model_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

pub struct SeparationCache {
    locks: BoundedLockTable<(PathBuf, PathBuf)>,
}

impl SeparationCache {
    pub fn new(lock_capacity: usize) -> Self {
        Self {
            locks: BoundedLockTable::new(lock_capacity),
        }
    }

    /// Expected stem locations for a separation run
    pub fn stem_paths(output_dir: &Path, model: &StemModel, track_name: &str) -> StemPaths {
        let track_dir = output_dir
            .join(sanitize_model_name(model.name))
            .join(track_name);
        StemPaths {
            primary: track_dir.join(PRIMARY_STEM_FILE),
            secondary: model
                .needs_secondary()
                .then(|| track_dir.join(SECONDARY_STEM_FILE)),
        }
    }

    /// Whether every stem the model produces exists
    pub fn is_complete(paths: &StemPaths) -> bool {
        paths.primary.is_file() && paths.secondary.as_ref().map_or(true, |p| p.is_file())
    }

    /// Return cached stems for `source`, running `compute` only when missing
    ///
    /// `compute` receives the paths it must write. The per-pair lock is held
    /// for the whole check-compute-verify sequence.
    pub fn separate_or_reuse<F>(
        &self,
        source: &Path,
        output_dir: &Path,
        track_name: &str,
        model: &StemModel,
        compute: F,
    ) -> Result<StemPaths, SeparationError>
    where
        F: FnOnce(&StemPaths) -> Result<(), SeparationError>,
    {
        if !source.is_file() {
            return Err(SeparationError::SourceMissing(source.to_path_buf()));
        }

        let paths = Self::stem_paths(output_dir, model, track_name);
        let lock = self
            .locks
            .get(&(source.to_path_buf(), output_dir.to_path_buf()));
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if Self::is_complete(&paths) {
            tracing::info!(
                model = model.name,
                vocals = %paths.primary.display(),
                "Separation cache hit"
            );
            return Ok(paths);
        }

        if let Some(track_dir) = paths.primary.parent() {
            std::fs::create_dir_all(track_dir)?;
        }

        tracing::info!(
            model = model.name,
            source = %source.display(),
            "Separation cache miss, running separator"
        );
        compute(&paths)?;

        if !Self::is_complete(&paths) {
            return Err(SeparationError::Failed(format!(
                "separator did not produce the expected stems in {}",
                paths
                    .primary
                    .parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )));
        }
        Ok(paths)
    }

    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

impl Default for SeparationCache {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_CAPACITY)
    }
}
