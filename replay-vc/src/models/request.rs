//! Conversion job request

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ConversionOptions;

/// A request to convert one song with one voice model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRequest {
    /// Local path or http(s) URL of the source audio
    pub song_url_or_file_path: String,

    /// Directory holding the voice model files
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Directory holding stemming model weights
    #[serde(default)]
    pub weights_path: Option<PathBuf>,

    /// Display id of the voice model
    #[serde(default)]
    pub model_id: Option<String>,

    /// Root of all job outputs; the service default applies when absent
    #[serde(default)]
    pub output_directory: Option<PathBuf>,

    /// Caller-supplied display name; derived from the source when absent
    #[serde(default)]
    pub track_name: Option<String>,

    #[serde(default)]
    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            song_url_or_file_path: source.into(),
            model_path: None,
            weights_path: None,
            model_id: None,
            output_directory: None,
            track_name: None,
            options: ConversionOptions::default(),
        }
    }

    /// Whether the source must be fetched over the network
    pub fn is_remote(&self) -> bool {
        let source = self.song_url_or_file_path.trim_start();
        source.starts_with("http://") || source.starts_with("https://")
    }

    /// Display name: the caller's, else the source base name without extension
    pub fn display_name(&self) -> String {
        if let Some(name) = self.track_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.trim().to_string();
        }
        let source = self.song_url_or_file_path.trim_end_matches('/');
        let base = source.rsplit(['/', '\\']).next().unwrap_or(source);
        let base = base.split(['?', '#']).next().unwrap_or(base);
        Path::new(base)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("untitled")
            .to_string()
    }

    /// Display id of the model: explicit id, model directory name, or stemming method
    pub fn display_model_id(&self) -> String {
        if let Some(id) = self.model_id.as_deref().filter(|id| !id.is_empty()) {
            return id.to_string();
        }
        self.model_path
            .as_deref()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.options.stemming_method.clone())
    }

    /// Whether this request runs voice conversion (and so needs a model)
    pub fn needs_model(&self) -> bool {
        !self.options.vocals_only
    }
}
