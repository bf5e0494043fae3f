//! Mock capabilities with invocation counters

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use replay_vc::capabilities::fetcher::file_name_for_url;
use replay_vc::capabilities::{
    Features, FetchError, ModelError, ModelLoader, PitchInput, SeparationError, SourceFetcher,
    StemModel, StemPaths, StemSeparator, VoiceModel,
};
use replay_vc::models::PitchMethod;
use replay_vc::pipeline::{PitchEstimator, PitchExtractor};
use replay_vc::services::{ConversionJobRunner, FfmpegLocation};

/// Writes a copy of the input as every stem
#[derive(Default)]
pub struct CountingSeparator {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub panic_next: AtomicBool,
}

impl CountingSeparator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StemSeparator for CountingSeparator {
    fn separate(
        &self,
        input: &Path,
        _model: &StemModel,
        _weights_dir: Option<&Path>,
        outputs: &StemPaths,
    ) -> Result<(), SeparationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("separator crashed");
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        std::fs::copy(input, &outputs.primary)?;
        if let Some(secondary) = &outputs.secondary {
            std::fs::copy(input, secondary)?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Echoes the analysis signal back at the target rate
pub struct EchoModel {
    pub target_rate: u32,
    pub pitch: bool,
    pub calls: AtomicUsize,
}

impl EchoModel {
    pub fn new(target_rate: u32, pitch: bool) -> Self {
        Self {
            target_rate,
            pitch,
            calls: AtomicUsize::new(0),
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
        let data = audio
            .chunks_exact(320)
            .map(|c| c.iter().map(|s| s.abs()).sum::<f32>() / 320.0)
            .collect();
        Ok(Features::new(1, data))
    }

    fn infer(
        &self,
        features: &Features,
        _pitch: Option<PitchInput<'_>>,
        _speaker_id: u32,
    ) -> Result<Vec<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let per_frame = self.target_rate as usize / 100;
        Ok(features
            .data()
            .iter()
            .enumerate()
            .flat_map(|(i, &v)| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                std::iter::repeat(sign * v.min(1.0)).take(per_frame)
            })
            .collect())
    }
}

/// Hands out [`EchoModel`]s and counts loads
pub struct EchoLoader {
    pub target_rate: u32,
    pub loads: AtomicUsize,
}

impl EchoLoader {
    pub fn new(target_rate: u32) -> Arc<Self> {
        Arc::new(Self {
            target_rate,
            loads: AtomicUsize::new(0),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for EchoLoader {
    fn load(&self, _model_dir: &Path) -> Result<Arc<dyn VoiceModel>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(EchoModel::new(self.target_rate, true)))
    }
}

/// Constant 200 Hz curve for the rmvpe method
#[derive(Default)]
pub struct FlatEstimator {
    pub calls: AtomicUsize,
}

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
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![200.0; p_len])
    }
}

/// Rejects every download
pub struct NoFetcher;

impl SourceFetcher for NoFetcher {
    fn fetch(&self, url: &str, _dest_dir: &Path) -> Result<PathBuf, FetchError> {
        Err(FetchError::Request {
            url: url.to_string(),
            message: "network disabled in tests".to_string(),
        })
    }
}

/// "Downloads" by copying a local file
pub struct CopyFetcher {
    pub source: PathBuf,
    pub calls: AtomicUsize,
}

impl SourceFetcher for CopyFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(dest_dir)?;
        let dest = dest_dir.join(file_name_for_url(url));
        std::fs::copy(&self.source, &dest)?;
        Ok(dest)
    }
}

/// Runner over mocks, without ffmpeg, with a flat rmvpe estimator
pub fn test_runner(
    separator: Arc<CountingSeparator>,
    loader: Arc<EchoLoader>,
) -> ConversionJobRunner {
    let mut pitch = PitchExtractor::new();
    pitch.register(Arc::new(FlatEstimator::default()));
    ConversionJobRunner::new(separator, loader, Arc::new(NoFetcher))
        .with_pitch_extractor(Arc::new(pitch))
        .with_ffmpeg(FfmpegLocation::Disabled)
}
