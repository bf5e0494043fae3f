//! Stem separation capability and model catalog

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during stem separation
#[derive(Debug, Error)]
pub enum SeparationError {
    #[error("Source audio not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Unknown stemming model: {0}")]
    UnknownModel(String),

    /// Backend or weights missing
    #[error("Stem separation unavailable: {0}")]
    Unavailable(String),

    #[error("Separation failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Separation model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StemArchitecture {
    #[serde(rename = "VR Arc")]
    Vr,
    #[serde(rename = "MDX-Net")]
    MdxNet,
    #[serde(rename = "Demucs")]
    Demucs,
}

/// Stem a model writes as its primary output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StemKind {
    Vocals,
    Instrumental,
    #[serde(rename = "No Echo")]
    NoEcho,
    #[serde(rename = "No Other")]
    NoOther,
}

/// A separation model known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StemModel {
    pub name: &'static str,
    pub architecture: StemArchitecture,
    pub primary_stem: StemKind,
}

impl StemModel {
    /// Whether the model also writes a secondary (remainder) stem
    pub fn needs_secondary(&self) -> bool {
        self.primary_stem != StemKind::NoOther
    }
}

/// De-echo/de-reverb model used for the optional second vocal pass
pub const DE_ECHO_MODEL: &str = "UVR-DeEcho-DeReverb by FoxJoy";

const CATALOG: [StemModel; 9] = [
    StemModel {
        name: "5_HP-Karaoke-UVR",
        architecture: StemArchitecture::Vr,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "6_HP-Karaoke-UVR",
        architecture: StemArchitecture::Vr,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: DE_ECHO_MODEL,
        architecture: StemArchitecture::Vr,
        primary_stem: StemKind::NoEcho,
    },
    StemModel {
        name: "UVR-MDX-NET Voc FT",
        architecture: StemArchitecture::MdxNet,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "UVR-MDX-NET Karaoke",
        architecture: StemArchitecture::MdxNet,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "UVR-MDX-NET Karaoke 2",
        architecture: StemArchitecture::MdxNet,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "UVR_MDXNET_9482",
        architecture: StemArchitecture::MdxNet,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "v4 | htdemucs_ft",
        architecture: StemArchitecture::Demucs,
        primary_stem: StemKind::Vocals,
    },
    StemModel {
        name: "v4 | htdemucs",
        architecture: StemArchitecture::Demucs,
        primary_stem: StemKind::Vocals,
    },
];

/// All separation models the service accepts
pub fn catalog() -> &'static [StemModel] {
    &CATALOG
}

/// Look up a model by exact name
pub fn find_stem_model(name: &str) -> Option<&'static StemModel> {
    CATALOG.iter().find(|m| m.name == name)
}

/// Expected output files of one separation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StemPaths {
    /// Primary stem (vocals for every vocal model)
    pub primary: PathBuf,
    /// Remainder stem; `None` when the model writes none
    pub secondary: Option<PathBuf>,
}

/// External stem separation backend
pub trait StemSeparator: Send + Sync {
    /// Separate `input` with `model`, writing the files named in `outputs`
    ///
    /// `weights_dir` is the directory holding model weights, if configured.
    fn separate(
        &self,
        input: &Path,
        model: &StemModel,
        weights_dir: Option<&Path>,
        outputs: &StemPaths,
    ) -> Result<(), SeparationError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool {
        true
    }
}

/// Separator used when no backend is linked
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableSeparator;

impl StemSeparator for UnavailableSeparator {
    fn separate(
        &self,
        _input: &Path,
        model: &StemModel,
        _weights_dir: Option<&Path>,
        _outputs: &StemPaths,
    ) -> Result<(), SeparationError> {
        Err(SeparationError::Unavailable(format!(
            "no separation backend is linked for model '{}'",
            model.name
        )))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }
}
