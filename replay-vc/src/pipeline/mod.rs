//! Voice conversion pipeline
//!
//! Turns 16 kHz mono vocals into converted 16-bit audio at the model's
//! rate (or a requested resample rate):
//!
//! 1. High-pass filter, then split long inputs at quiet points
//! 2. Pitch curve for the padded signal (cached beside the source file)
//! 3. Per chunk: features, optional index blending, consonant protection,
//!    synthesis, then trimming of the context padding
//! 4. Concatenation, volume envelope matching, resampling, 16-bit scaling
//!
//! Cancellation is checked before the pitch stage, before every chunk and
//! before post-processing.

pub mod chunking;
pub mod features;
pub mod filter;
pub mod normalize;
pub mod pitch;
pub mod volume;

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::audio::{AudioBuffer, Resampler};
use crate::capabilities::{ModelError, PitchInput, VoiceModel};
use crate::models::{ConversionOptions, PitchMethod};

pub use chunking::{find_boundaries, plan_chunks, reflect_pad, ChunkSpan};
pub use filter::HighPassFilter;
pub use pitch::{
    quantize_coarse, AutocorrelationEstimator, PitchEstimator, PitchExtractor, PitchParams,
};

/// Analysis sample rate expected by the feature extractor
pub const ANALYSIS_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Input audio is empty")]
    EmptyInput,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Resampling failed: {0}")]
    Resample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Conversion stopped")]
    Stopped,
}

/// Window and padding sizes in samples at the analysis rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub sample_rate: u32,
    /// Pitch frame hop
    pub window: usize,
    /// Context added on each side of every chunk
    pub t_pad: usize,
    /// Search radius around each nominal boundary
    pub t_query: usize,
    /// Nominal chunk length
    pub t_center: usize,
    /// Inputs up to this length are converted in one piece
    pub t_max: usize,
    /// Context seconds, used to trim model output at its own rate
    pub pad_seconds: u32,
}

impl Timing {
    pub fn from_seconds(x_pad: u32, x_query: u32, x_center: u32, x_max: u32) -> Self {
        let sr = ANALYSIS_SAMPLE_RATE as usize;
        Self {
            sample_rate: ANALYSIS_SAMPLE_RATE,
            window: 160,
            t_pad: sr * x_pad as usize,
            t_query: sr * x_query as usize,
            t_center: sr * x_center as usize,
            t_max: sr * x_max as usize,
            pad_seconds: x_pad,
        }
    }

    pub fn t_pad2(&self) -> usize {
        self.t_pad * 2
    }

    /// Context length in output samples at `target_rate`
    pub fn t_pad_tgt(&self, target_rate: u32) -> usize {
        target_rate as usize * self.pad_seconds as usize
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self::from_seconds(1, 6, 38, 41)
    }
}

/// Numeric parameters of one conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConversionParams {
    pub pitch_shift: i32,
    pub f0_method: PitchMethod,
    pub index_ratio: f32,
    pub protect: f32,
    pub filter_radius: u32,
    pub hop_length: u32,
    pub volume_envelope: f32,
    pub resample_sr: u32,
    pub speaker_id: u32,
}

impl ConversionParams {
    pub fn from_options(options: &ConversionOptions) -> Self {
        Self {
            pitch_shift: options.pitch_shift(),
            f0_method: options.f0_method,
            index_ratio: options.index_ratio,
            protect: options.consonant_protection,
            filter_radius: options.filter_radius,
            hop_length: options.crepe_hop_length,
            volume_envelope: options.volume_envelope,
            resample_sr: options.resample_sr,
            speaker_id: options.speaker_id,
        }
    }

    fn pitch_params(&self) -> PitchParams {
        PitchParams {
            method: self.f0_method,
            pitch_shift: self.pitch_shift,
            filter_radius: self.filter_radius,
            hop_length: self.hop_length,
        }
    }
}

impl Default for ConversionParams {
    fn default() -> Self {
        Self::from_options(&ConversionOptions::default())
    }
}

/// Receives progress from a running conversion
pub trait PipelineObserver {
    fn stage(&self, _message: &str) {}

    fn chunk_completed(&self, _done: usize, _total: usize) {}
}

impl PipelineObserver for () {}

pub struct ConversionPipeline {
    model: Arc<dyn VoiceModel>,
    pitch: Arc<PitchExtractor>,
    timing: Timing,
    high_pass: HighPassFilter,
}

impl ConversionPipeline {
    pub fn new(model: Arc<dyn VoiceModel>, pitch: Arc<PitchExtractor>) -> Self {
        Self::with_timing(model, pitch, Timing::default())
    }

    pub fn with_timing(
        model: Arc<dyn VoiceModel>,
        pitch: Arc<PitchExtractor>,
        timing: Timing,
    ) -> Self {
        Self {
            model,
            pitch,
            high_pass: HighPassFilter::rumble(timing.sample_rate),
            timing,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    /// Convert 16 kHz mono audio
    ///
    /// `source` names the file the audio came from; pitch curves are
    /// cached beside it. Returns 16-bit audio at the model's rate, or at
    /// `resample_sr` when that is at least 16 kHz.
    pub fn convert(
        &self,
        audio: &[f32],
        source: Option<&Path>,
        params: &ConversionParams,
        cancel: &CancellationToken,
        observer: &dyn PipelineObserver,
    ) -> Result<AudioBuffer<i16>, PipelineError> {
        if audio.is_empty() {
            return Err(PipelineError::EmptyInput);
        }
        let timing = &self.timing;
        let target_rate = self.model.target_sample_rate();

        observer.stage("Processing audio...");
        let filtered = self.high_pass.filtfilt(audio);
        let boundaries = find_boundaries(&filtered, timing);
        let padded = reflect_pad(&filtered, timing.t_pad);
        let p_len = padded.len() / timing.window;

        check_cancelled(cancel)?;
        let pitch = if self.model.uses_pitch() {
            observer.stage("Getting f0...");
            let mut fine = self
                .pitch
                .extract(
                    &padded,
                    timing.sample_rate,
                    timing.window,
                    p_len,
                    &params.pitch_params(),
                    source,
                )?
                .into_values();
            fine.resize(p_len, 0.0);
            let coarse = quantize_coarse(&fine);
            Some((coarse, fine))
        } else {
            None
        };

        let spans = plan_chunks(padded.len(), p_len, &boundaries, timing);
        let total = spans.len();
        tracing::info!(
            model = self.model.name(),
            chunks = total,
            samples = audio.len(),
            "Converting audio"
        );
        observer.stage("Changing voice...");

        let trim = timing.t_pad_tgt(target_rate);
        let mut converted = Vec::new();
        for (index, span) in spans.iter().enumerate() {
            check_cancelled(cancel)?;
            let chunk_pitch = pitch.as_ref().map(|(coarse, fine)| PitchInput {
                coarse: &coarse[span.pitch.clone()],
                fine: &fine[span.pitch.clone()],
            });
            let output = self.convert_chunk(&padded[span.audio.clone()], chunk_pitch, params)?;
            let kept = chunking::trim_padding(&output, trim);
            tracing::debug!(
                chunk = index + 1,
                total,
                input = span.audio.len(),
                output = output.len(),
                kept = kept.len(),
                "Chunk converted"
            );
            converted.extend_from_slice(kept);
            observer.chunk_completed(index + 1, total);
        }

        check_cancelled(cancel)?;
        let converted = volume::match_envelope(
            &filtered,
            timing.sample_rate,
            converted,
            target_rate,
            params.volume_envelope,
        );

        let mut output = AudioBuffer::mono(converted, target_rate);
        if params.resample_sr >= ANALYSIS_SAMPLE_RATE && params.resample_sr != target_rate {
            observer.stage("Resampling...");
            output = Resampler::resample(output, params.resample_sr)
                .map_err(|e| PipelineError::Resample(format!("{:#}", e)))?;
        }

        let rate = output.sample_rate();
        Ok(AudioBuffer::mono(normalize::to_pcm16(output.samples()), rate))
    }

    fn convert_chunk(
        &self,
        chunk: &[f32],
        pitch: Option<PitchInput<'_>>,
        params: &ConversionParams,
    ) -> Result<Vec<f32>, PipelineError> {
        let mut feats = self.model.extract_features(chunk)?;
        let protecting = params.protect < 0.5 && pitch.is_some();
        let original = protecting.then(|| feats.clone());

        if params.index_ratio != 0.0 {
            if let Some(matches) = self.model.search_index(&feats, features::INDEX_NEIGHBORS)? {
                if matches.is_empty() {
                    tracing::debug!("Index returned no matches, using raw features");
                } else {
                    features::blend_with_index(&mut feats, &matches, params.index_ratio);
                }
            }
        }

        let mut feats = feats.upsample2();
        let original = original.map(|o| o.upsample2());

        let p_len = (chunk.len() / self.timing.window).min(feats.frames());
        feats.truncate(p_len);
        let pitch = pitch.map(|p| PitchInput {
            coarse: &p.coarse[..p.coarse.len().min(p_len)],
            fine: &p.fine[..p.fine.len().min(p_len)],
        });

        if let (Some(original), Some(p)) = (original.as_ref(), pitch.as_ref()) {
            features::protect_consonants(&mut feats, original, p.fine, params.protect);
        }

        Ok(self.model.infer(&feats, pitch, params.speaker_id)?)
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Stopped)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Features;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns the chunk's own samples resampled to the target rate
    struct EchoModel {
        target_rate: u32,
        pitch: bool,
        calls: AtomicUsize,
        pitch_lengths: Mutex<Vec<usize>>,
    }

    impl EchoModel {
        fn new(target_rate: u32, pitch: bool) -> Self {
            Self {
                target_rate,
                pitch,
                calls: AtomicUsize::new(0),
                pitch_lengths: Mutex::new(Vec::new()),
            }
        }
    }

    impl VoiceModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn target_sample_rate(&self) -> u32 {
            self.target_rate
        }

        fn uses_pitch(&self) -> bool {
            self.pitch
        }

        fn extract_features(&self, audio: &[f32]) -> Result<Features, ModelError> {
            // One frame per 320 samples, frame value = mean sample
            let data = audio
                .chunks(320)
                .filter(|c| c.len() == 320)
                .map(|c| c.iter().sum::<f32>() / 320.0)
                .collect();
            Ok(Features::new(1, data))
        }

        fn infer(
            &self,
            features: &Features,
            pitch: Option<PitchInput<'_>>,
            _speaker_id: u32,
        ) -> Result<Vec<f32>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(p) = pitch {
                self.pitch_lengths.lock().unwrap().push(p.fine.len());
            }
            // 160 analysis samples per frame at 16 kHz
            let per_frame = self.target_rate as usize / 100;
            Ok(features
                .data()
                .iter()
                .flat_map(|&v| std::iter::repeat(v.clamp(-1.0, 1.0) * 0.5).take(per_frame))
                .collect())
        }
    }

    /// Constant 150 Hz curve; keeps long tests fast
    struct FlatEstimator;

    impl PitchEstimator for FlatEstimator {
        fn method(&self) -> PitchMethod {
            PitchMethod::Rmvpe
        }

        fn estimate(
            &self,
            _audio: &[f32],
            _sample_rate: u32,
            _hop: usize,
            p_len: usize,
        ) -> Result<Vec<f32>, ModelError> {
            Ok(vec![150.0; p_len])
        }
    }

    fn flat_extractor() -> Arc<PitchExtractor> {
        let mut extractor = PitchExtractor::new();
        extractor.register(Arc::new(FlatEstimator));
        Arc::new(extractor)
    }

    fn tone(seconds: usize) -> Vec<f32> {
        (0..16000 * seconds)
            .map(|i| 0.3 * (i as f32 * 0.08).sin())
            .collect()
    }

    #[test]
    fn test_short_audio_is_one_chunk() {
        let model = Arc::new(EchoModel::new(40000, true));
        let pipeline = ConversionPipeline::new(model.clone(), Arc::new(PitchExtractor::new()));
        let out = pipeline
            .convert(
                &tone(5),
                None,
                &ConversionParams::default(),
                &CancellationToken::new(),
                &(),
            )
            .unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out.sample_rate(), 40000);
        // 7 s padded input, 1 s of context trimmed from each end
        assert_eq!(out.frames(), 40000 * 5);
    }

    #[test]
    fn test_long_audio_is_chunked_and_length_preserved() {
        let model = Arc::new(EchoModel::new(16000, true));
        let pipeline = ConversionPipeline::new(model.clone(), flat_extractor());
        let audio = tone(50);
        let out = pipeline
            .convert(
                &audio,
                None,
                &ConversionParams::default(),
                &CancellationToken::new(),
                &(),
            )
            .unwrap();

        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
        let diff = (out.frames() as i64 - audio.len() as i64).abs();
        assert!(diff <= 2 * 160, "length differs by {}", diff);
        for len in model.pitch_lengths.lock().unwrap().iter() {
            assert!(*len > 0);
        }
    }

    #[test]
    fn test_resample_rate_applied() {
        let model = Arc::new(EchoModel::new(40000, false));
        let pipeline = ConversionPipeline::new(model, flat_extractor());
        let params = ConversionParams {
            resample_sr: 48000,
            ..ConversionParams::default()
        };
        let out = pipeline
            .convert(&tone(2), None, &params, &CancellationToken::new(), &())
            .unwrap();
        assert_eq!(out.sample_rate(), 48000);
        assert_eq!(out.frames(), 48000 * 2);
    }

    #[test]
    fn test_empty_input_rejected() {
        let pipeline = ConversionPipeline::new(
            Arc::new(EchoModel::new(40000, true)),
            flat_extractor(),
        );
        let err = pipeline
            .convert(&[], None, &ConversionParams::default(), &CancellationToken::new(), &())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyInput));
    }

    #[test]
    fn test_cancelled_before_start_stops() {
        let model = Arc::new(EchoModel::new(40000, true));
        let pipeline = ConversionPipeline::new(model.clone(), flat_extractor());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = pipeline
            .convert(&tone(1), None, &ConversionParams::default(), &cancel, &())
            .unwrap_err();
        assert!(matches!(err, PipelineError::Stopped));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timing_constants() {
        let t = Timing::default();
        assert_eq!(t.t_pad, 16000);
        assert_eq!(t.t_query, 96000);
        assert_eq!(t.t_center, 608000);
        assert_eq!(t.t_max, 656000);
        assert_eq!(t.t_pad_tgt(40000), 40000);
    }
}
