//! Voice model capability
//!
//! The feature extractor, synthesizer and retrieval index are opaque: the
//! pipeline only sees this trait. Calls may be slow but have no side effects
//! visible to the pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised by model capabilities
#[derive(Debug, Error)]
pub enum ModelError {
    /// Model files or runtime missing
    #[error("{0}")]
    Unavailable(String),

    /// A model call failed
    #[error("Model inference failed: {0}")]
    Inference(String),
}

/// Frame-major feature matrix (`frames x dim`)
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    dim: usize,
    data: Vec<f32>,
}

impl Features {
    /// Wrap row-major data; trailing values that do not fill a frame are dropped
    pub fn new(dim: usize, mut data: Vec<f32>) -> Self {
        let dim = dim.max(1);
        let frames = data.len() / dim;
        data.truncate(frames * dim);
        Self { dim, data }
    }

    pub fn zeros(frames: usize, dim: usize) -> Self {
        Self::new(dim, vec![0.0; frames * dim.max(1)])
    }

    pub fn frames(&self) -> usize {
        self.data.len() / self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn frame(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn frame_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.data[index * self.dim..(index + 1) * self.dim]
    }

    pub fn truncate(&mut self, frames: usize) {
        self.data.truncate(frames * self.dim);
    }

    /// Nearest-neighbor upsampling: every frame repeated twice
    pub fn upsample2(&self) -> Features {
        let mut data = Vec::with_capacity(self.data.len() * 2);
        for frame in self.data.chunks_exact(self.dim) {
            data.extend_from_slice(frame);
            data.extend_from_slice(frame);
        }
        Features {
            dim: self.dim,
            data,
        }
    }
}

/// Nearest neighbors returned by a retrieval index search
///
/// For every query frame there are `k` entries in `scores` and `ids`, and
/// `k * dim` values in `vectors` (the stored neighbor vectors). Negative
/// ids mark empty slots.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMatches {
    pub k: usize,
    pub scores: Vec<f32>,
    pub ids: Vec<i64>,
    pub vectors: Vec<f32>,
}

impl IndexMatches {
    /// Number of query frames covered
    pub fn frames(&self) -> usize {
        if self.k == 0 {
            0
        } else {
            self.ids.len() / self.k
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }
}

/// Pitch conditioning for pitch-aware models
#[derive(Debug, Clone, Copy)]
pub struct PitchInput<'a> {
    /// Quantized mel-scale pitch in [1, 255]
    pub coarse: &'a [i64],
    /// Raw pitch in Hz, 0 where unvoiced
    pub fine: &'a [f32],
}

/// External voice model
pub trait VoiceModel: Send + Sync {
    /// Display name for logging
    fn name(&self) -> &str;

    /// Native output sample rate of `infer`
    fn target_sample_rate(&self) -> u32;

    /// Whether `infer` expects pitch conditioning
    fn uses_pitch(&self) -> bool;

    /// Content features of 16 kHz mono audio (one frame per 320 samples)
    fn extract_features(&self, audio: &[f32]) -> Result<Features, ModelError>;

    /// k-nearest-neighbor search in the retrieval index
    ///
    /// `Ok(None)` means the model has no index.
    fn search_index(
        &self,
        _features: &Features,
        _k: usize,
    ) -> Result<Option<IndexMatches>, ModelError> {
        Ok(None)
    }

    /// Synthesize audio at `target_sample_rate` from features
    fn infer(
        &self,
        features: &Features,
        pitch: Option<PitchInput<'_>>,
        speaker_id: u32,
    ) -> Result<Vec<f32>, ModelError>;
}

/// Loads a voice model from its directory
pub trait ModelLoader: Send + Sync {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn VoiceModel>, ModelError>;
}

/// Weight and index files found in a model directory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelFiles {
    pub weights: Vec<PathBuf>,
    pub indexes: Vec<PathBuf>,
}

const WEIGHT_EXTENSIONS: [&str; 4] = ["pth", "onnx", "safetensors", "pt"];

/// Scan a model directory (and its immediate sub-directories)
pub fn find_model_files(model_dir: &Path) -> ModelFiles {
    let mut files = ModelFiles::default();
    for entry in WalkDir::new(model_dir)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let extension = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some(ext) if WEIGHT_EXTENSIONS.contains(&ext) => {
                files.weights.push(entry.into_path())
            }
            Some("index") => files.indexes.push(entry.into_path()),
            _ => {}
        }
    }
    files
}

/// Default loader: validates the model directory, no inference runtime
///
/// Deployments link a real runtime by supplying their own [`ModelLoader`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryModelLoader;

impl ModelLoader for DirectoryModelLoader {
    fn load(&self, model_dir: &Path) -> Result<Arc<dyn VoiceModel>, ModelError> {
        let files = find_model_files(model_dir);
        let Some(weights) = files.weights.first() else {
            return Err(ModelError::Unavailable(format!(
                "No model files found in {}",
                model_dir.display()
            )));
        };
        tracing::warn!(
            weights = %weights.display(),
            indexes = files.indexes.len(),
            "Model files found but no inference runtime is linked"
        );
        Err(ModelError::Unavailable(format!(
            "No inference runtime available for {}",
            weights.display()
        )))
    }
}
