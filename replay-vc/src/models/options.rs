//! Conversion option bundle
//!
//! Every field has an explicit default applied only when the field is
//! absent from the request; a present zero stays zero.

use serde::{Deserialize, Serialize};

/// Pitch (f0) extraction method
///
/// Unrecognized method names deserialize to [`PitchMethod::Rmvpe`], the
/// most robust estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", from = "String")]
pub enum PitchMethod {
    Pm,
    Harvest,
    Crepe,
    CrepeTiny,
    MangioCrepe,
    MangioCrepeTiny,
    #[default]
    Rmvpe,
}

impl PitchMethod {
    pub const ALL: [PitchMethod; 7] = [
        PitchMethod::Pm,
        PitchMethod::Harvest,
        PitchMethod::Crepe,
        PitchMethod::CrepeTiny,
        PitchMethod::MangioCrepe,
        PitchMethod::MangioCrepeTiny,
        PitchMethod::Rmvpe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PitchMethod::Pm => "pm",
            PitchMethod::Harvest => "harvest",
            PitchMethod::Crepe => "crepe",
            PitchMethod::CrepeTiny => "crepe-tiny",
            PitchMethod::MangioCrepe => "mangio-crepe",
            PitchMethod::MangioCrepeTiny => "mangio-crepe-tiny",
            PitchMethod::Rmvpe => "rmvpe",
        }
    }

    /// Parse a method name, falling back to rmvpe
    pub fn parse_lossy(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or_default()
    }
}

impl From<String> for PitchMethod {
    fn from(value: String) -> Self {
        Self::parse_lossy(&value)
    }
}

impl std::fmt::Display for PitchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final mix container/bitrate
///
/// Absent values default to [`OutputFormat::Mp3_320k`]; unrecognized ones
/// deserialize to [`OutputFormat::Mp3_192k`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
#[allow(non_camel_case_types)]
pub enum OutputFormat {
    #[serde(rename = "wav")]
    Wav,
    #[serde(rename = "mp3_192k")]
    Mp3_192k,
    #[default]
    #[serde(rename = "mp3_320k")]
    Mp3_320k,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3_192k => "mp3_192k",
            OutputFormat::Mp3_320k => "mp3_320k",
        }
    }

    /// File name of the final mix
    pub fn file_name(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "final.wav",
            OutputFormat::Mp3_192k | OutputFormat::Mp3_320k => "final.mp3",
        }
    }

    /// ffmpeg bitrate argument, `None` for uncompressed output
    pub fn bitrate(&self) -> Option<&'static str> {
        match self {
            OutputFormat::Wav => None,
            OutputFormat::Mp3_192k => Some("192k"),
            OutputFormat::Mp3_320k => Some("320k"),
        }
    }

    pub fn needs_encoder(&self) -> bool {
        self.bitrate().is_some()
    }
}

impl From<String> for OutputFormat {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "wav" => OutputFormat::Wav,
            "mp3_320k" => OutputFormat::Mp3_320k,
            "mp3_192k" => OutputFormat::Mp3_192k,
            other => {
                tracing::info!(format = other, "Unsupported output format, using mp3_192k");
                OutputFormat::Mp3_192k
            }
        }
    }
}

/// Per-job conversion options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOptions {
    /// Vocal pitch shift in semitones (absent = 0)
    #[serde(default)]
    pub pitch: Option<i32>,

    /// Instrumental pitch shift in semitones (absent = unshifted)
    #[serde(default)]
    pub instrumentals_pitch: Option<i32>,

    /// Source is already an isolated vocal track
    #[serde(default)]
    pub pre_stemmed: bool,

    /// Stop after separation; output is the vocal stem
    #[serde(default)]
    pub vocals_only: bool,

    /// Convert only a 30 second preview
    #[serde(default)]
    pub sample_mode: bool,

    /// Preview start offset in seconds
    #[serde(default)]
    pub sample_mode_start_time: f64,

    /// Run a de-echo/de-reverb separation pass on the vocals
    #[serde(default)]
    pub de_echo_de_reverb: bool,

    #[serde(default)]
    pub f0_method: PitchMethod,

    /// Stemming model name (default: "UVR-MDX-NET Voc FT")
    #[serde(default = "default_stemming_method")]
    pub stemming_method: String,

    /// Retrieval blend ratio in [0, 1] (default: 0.75)
    #[serde(default = "default_index_ratio")]
    pub index_ratio: f32,

    /// Consonant protection in [0, 0.5] (default: 0.35)
    #[serde(default = "default_consonant_protection")]
    pub consonant_protection: f32,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Volume-envelope mix rate in [0, 1] (default: 1.0, no matching)
    #[serde(default = "default_volume_envelope")]
    pub volume_envelope: f32,

    /// Median filter radius for harvest pitch curves (default: 3)
    #[serde(default = "default_filter_radius")]
    pub filter_radius: u32,

    /// Hop length for crepe-family estimators (default: 160)
    #[serde(default = "default_crepe_hop_length")]
    pub crepe_hop_length: u32,

    /// Resample target in Hz; 0 keeps the model's native rate
    #[serde(default)]
    pub resample_sr: u32,

    #[serde(default)]
    pub speaker_id: u32,
}

pub const DEFAULT_STEMMING_METHOD: &str = "UVR-MDX-NET Voc FT";

fn default_stemming_method() -> String {
    DEFAULT_STEMMING_METHOD.to_string()
}

fn default_index_ratio() -> f32 {
    0.75
}

fn default_consonant_protection() -> f32 {
    0.35
}

fn default_volume_envelope() -> f32 {
    1.0
}

fn default_filter_radius() -> u32 {
    3
}

fn default_crepe_hop_length() -> u32 {
    160
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            pitch: None,
            instrumentals_pitch: None,
            pre_stemmed: false,
            vocals_only: false,
            sample_mode: false,
            sample_mode_start_time: 0.0,
            de_echo_de_reverb: false,
            f0_method: PitchMethod::default(),
            stemming_method: default_stemming_method(),
            index_ratio: default_index_ratio(),
            consonant_protection: default_consonant_protection(),
            output_format: OutputFormat::default(),
            volume_envelope: default_volume_envelope(),
            filter_radius: default_filter_radius(),
            crepe_hop_length: default_crepe_hop_length(),
            resample_sr: 0,
            speaker_id: 0,
        }
    }
}

impl ConversionOptions {
    /// Vocal pitch shift, absent meaning no shift
    pub fn pitch_shift(&self) -> i32 {
        self.pitch.unwrap_or(0)
    }

    /// Check numeric ranges; returns a description of the first violation
    pub fn validate(&self) -> Result<(), String> {
        check_range("indexRatio", self.index_ratio, 0.0, 1.0)?;
        check_range("consonantProtection", self.consonant_protection, 0.0, 0.5)?;
        check_range("volumeEnvelope", self.volume_envelope, 0.0, 1.0)?;

        if !self.sample_mode_start_time.is_finite() || self.sample_mode_start_time < 0.0 {
            return Err(format!(
                "sampleModeStartTime must be a non-negative number of seconds, got {}",
                self.sample_mode_start_time
            ));
        }
        if self.crepe_hop_length == 0 {
            return Err("crepeHopLength must be positive".to_string());
        }
        Ok(())
    }
}

fn check_range(name: &str, value: f32, min: f32, max: f32) -> Result<(), String> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(format!("{} must be in [{}, {}], got {}", name, min, max, value))
    }
}
