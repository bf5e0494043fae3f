//! Capability seams for external collaborators
//!
//! The voice model, stem separator and source fetcher are supplied by the
//! deployment; the orchestrator only depends on these traits.

pub mod fetcher;
pub mod separator;
pub mod voice_model;

pub use fetcher::{FetchError, HttpFetcher, SourceFetcher};
pub use separator::{
    catalog, find_stem_model, SeparationError, StemArchitecture, StemKind, StemModel, StemPaths,
    StemSeparator, UnavailableSeparator, DE_ECHO_MODEL,
};
pub use voice_model::{
    find_model_files, DirectoryModelLoader, Features, IndexMatches, ModelError, ModelFiles,
    ModelLoader, PitchInput, VoiceModel,
};
